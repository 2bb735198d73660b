use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("Conflict detected: {0}")]
    ConflictDetected(String),

    #[error("Compensation failed during {step}: {message}")]
    CompensationFailed { step: &'static str, message: String },

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProvisioningError {
    /// Message of a remote failure, used for signature matching.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ProvisioningError::RemoteOperationFailed(message)
            | ProvisioningError::AuthenticationFailed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Uniqueness violation: {0}")]
    Conflict(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<RepositoryError> for ProvisioningError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ProvisioningError::NotFound(what),
            RepositoryError::Conflict(what) => ProvisioningError::ConflictDetected(what),
            RepositoryError::Storage(e) => ProvisioningError::Storage(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid vault key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

impl From<ProvisioningError> for AppError {
    fn from(err: ProvisioningError) -> Self {
        match err {
            ProvisioningError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            ProvisioningError::AuthenticationFailed(msg) => {
                AppError::BadGateway(format!("ERP authentication failed: {}", msg))
            }
            ProvisioningError::RemoteOperationFailed(msg) => AppError::BadGateway(msg),
            ProvisioningError::ConflictDetected(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ProvisioningError::CompensationFailed { step, message } => AppError::InternalError(
                anyhow::anyhow!("compensation of {} failed: {}", step, message),
            ),
            ProvisioningError::Storage(e) => AppError::DatabaseError(e),
            ProvisioningError::Vault(e) => AppError::InternalError(anyhow::Error::new(e)),
            ProvisioningError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_conflict_maps_to_conflict_detected() {
        let err: ProvisioningError = RepositoryError::Conflict("record".to_string()).into();
        assert!(matches!(err, ProvisioningError::ConflictDetected(_)));
    }

    #[test]
    fn test_remote_message_only_for_remote_failures() {
        assert_eq!(
            ProvisioningError::RemoteOperationFailed("boom".to_string()).remote_message(),
            Some("boom")
        );
        assert!(ProvisioningError::NotFound("user".to_string())
            .remote_message()
            .is_none());
    }
}

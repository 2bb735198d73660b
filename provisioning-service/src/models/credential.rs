//! Credentials and the outcomes handed back to callers.

use secrecy::{ExposeSecret, Secret};
use serde::Serialize;

/// Decrypted admin login for one Odoo database.
///
/// Lives for a single saga invocation; never cloned, logged or persisted.
#[derive(Debug)]
pub struct AdminCredentials {
    pub base_url: String,
    pub database_name: String,
    pub admin_login: String,
    pub admin_password: Secret<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiKey,
    Password,
}

/// Best credential available for a provisioned account.
#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(Secret<String>),
    Password(Secret<String>),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::ApiKey(_) => CredentialKind::ApiKey,
            Credential::Password(_) => CredentialKind::Password,
        }
    }

    pub fn expose(&self) -> &str {
        match self {
            Credential::ApiKey(secret) | Credential::Password(secret) => secret.expose_secret(),
        }
    }
}

/// A best-effort step that degraded without failing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisioningWarning {
    GroupNotResolved { group: String, reason: String },
    ApiKeyUnavailable { reason: String },
    CredentialUpgradeFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub remote_uid: i64,
    pub remote_login: String,
    pub credential: Credential,
    pub warnings: Vec<ProvisioningWarning>,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub database_name: String,
    pub remote_uid: i64,
    pub remote_login: String,
    pub credential: Credential,
    pub warnings: Vec<ProvisioningWarning>,
}

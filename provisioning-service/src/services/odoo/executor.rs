//! Remote method calls with one transparent re-authentication on session expiry.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::client::{OdooApi, RemoteSession};
use super::session::SessionAuthenticator;
use super::signatures::is_session_expired;
use crate::models::AdminCredentials;
use crate::services::error::ProvisioningError;

/// Bounds the session-refresh retry. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRetryPolicy {
    pub max_attempts: u32,
}

impl Default for SessionRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl SessionRetryPolicy {
    fn should_refresh(&self, attempt: u32, error: &ProvisioningError) -> bool {
        attempt < self.max_attempts && error.remote_message().is_some_and(is_session_expired)
    }
}

#[derive(Clone)]
pub struct RemoteCallExecutor {
    api: Arc<dyn OdooApi>,
    authenticator: SessionAuthenticator,
    policy: SessionRetryPolicy,
}

impl RemoteCallExecutor {
    pub fn new(api: Arc<dyn OdooApi>, policy: SessionRetryPolicy) -> Self {
        Self {
            authenticator: SessionAuthenticator::new(api.clone()),
            api,
            policy,
        }
    }

    pub fn authenticator(&self) -> &SessionAuthenticator {
        &self.authenticator
    }

    pub fn api(&self) -> &Arc<dyn OdooApi> {
        &self.api
    }

    /// Call `model.method` and decode the result as `T`.
    ///
    /// Without `admin` there is no retry. When the session is refreshed,
    /// `session` is replaced so later calls use the new one.
    pub async fn call<T: DeserializeOwned>(
        &self,
        session: &mut RemoteSession,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
        admin: Option<&AdminCredentials>,
    ) -> Result<T, ProvisioningError> {
        let mut attempt = 1;
        loop {
            let error = match self
                .api
                .call_kw(session, model, method, args.clone(), kwargs.clone())
                .await
            {
                Ok(value) => {
                    return serde_json::from_value(value).map_err(|e| {
                        ProvisioningError::RemoteOperationFailed(format!(
                            "unexpected {}.{} result: {}",
                            model, method, e
                        ))
                    });
                }
                Err(error) => error,
            };

            let Some(admin) = admin.filter(|_| self.policy.should_refresh(attempt, &error)) else {
                return Err(error);
            };

            warn!(model, method, attempt, "Odoo session expired, re-authenticating");
            *session = self.authenticator.authenticate(admin).await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_refreshes_only_on_first_expiry() {
        let policy = SessionRetryPolicy::default();
        let expired = ProvisioningError::RemoteOperationFailed("Session expired".to_string());
        let other = ProvisioningError::RemoteOperationFailed("Access denied".to_string());

        assert!(policy.should_refresh(1, &expired));
        assert!(!policy.should_refresh(2, &expired));
        assert!(!policy.should_refresh(1, &other));
        assert!(!policy.should_refresh(1, &ProvisioningError::NotFound("x".to_string())));
    }
}

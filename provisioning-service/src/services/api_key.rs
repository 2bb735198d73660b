//! Best-effort API key issuance through the dedicated provisioning endpoint.

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tracing::{info, warn};

use super::odoo::{ApiKeyRequest, OdooApi, RemoteSession};
use crate::config::OdooSettings;
use crate::models::ProvisioningWarning;

#[derive(Clone)]
pub struct ApiKeyIssuer {
    api: Arc<dyn OdooApi>,
    name: String,
    scope: String,
}

impl ApiKeyIssuer {
    pub fn new(api: Arc<dyn OdooApi>, settings: &OdooSettings) -> Self {
        Self {
            api,
            name: settings.api_key_name.clone(),
            scope: settings.api_key_scope.clone(),
        }
    }

    /// Never retried; any failure degrades to `ApiKeyUnavailable`.
    pub async fn issue(
        &self,
        session: &RemoteSession,
        remote_uid: i64,
    ) -> Result<Secret<String>, ProvisioningWarning> {
        let request = ApiKeyRequest {
            user_id: remote_uid,
            name: self.name.clone(),
            scope: self.scope.clone(),
        };

        let unavailable = |reason: String| {
            warn!(remote_uid, reason = %reason, "API key unavailable, using password");
            ProvisioningWarning::ApiKeyUnavailable { reason }
        };

        let result = self
            .api
            .generate_api_key(session, &request)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !result.ok {
            return Err(unavailable(
                result
                    .error
                    .unwrap_or_else(|| "endpoint reported failure".to_string()),
            ));
        }

        match result.token {
            Some(token) if !token.expose_secret().is_empty() => {
                info!(remote_uid, key_id = ?result.id, "API key issued");
                Ok(token)
            }
            _ => Err(unavailable("response carried no token".to_string())),
        }
    }
}

use std::sync::Arc;
use tracing::{info, instrument};

use super::client::{OdooApi, RemoteSession};
use crate::models::AdminCredentials;
use crate::services::error::ProvisioningError;

/// Exchanges admin credentials for a fresh, unpooled Odoo session.
#[derive(Clone)]
pub struct SessionAuthenticator {
    api: Arc<dyn OdooApi>,
}

impl SessionAuthenticator {
    pub fn new(api: Arc<dyn OdooApi>) -> Self {
        Self { api }
    }

    #[instrument(skip(self, credentials), fields(database = %credentials.database_name))]
    pub async fn authenticate(
        &self,
        credentials: &AdminCredentials,
    ) -> Result<RemoteSession, ProvisioningError> {
        let response = self
            .api
            .authenticate(
                &credentials.base_url,
                &credentials.database_name,
                &credentials.admin_login,
                &credentials.admin_password,
            )
            .await?;

        let uid = response.uid.filter(|uid| *uid > 0).ok_or_else(|| {
            ProvisioningError::AuthenticationFailed(format!(
                "no user id returned for database '{}'",
                credentials.database_name
            ))
        })?;

        let session_id = response.effective_session_id();
        if session_id.is_none() && response.cookies.is_empty() {
            return Err(ProvisioningError::AuthenticationFailed(
                "no session id or cookies in authenticate response".to_string(),
            ));
        }

        info!(
            remote_uid = uid,
            cookies = response.cookies.len(),
            "Odoo session established"
        );

        Ok(RemoteSession {
            base_url: credentials.base_url.clone(),
            session_id,
            cookies: response.cookies,
            remote_user_id: uid,
        })
    }
}

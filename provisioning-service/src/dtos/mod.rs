use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{CredentialKind, ProvisionOutcome, ProvisioningWarning, UserCredentials};

#[derive(Debug, Deserialize, Validate)]
pub struct ProvisionUserRequest {
    #[validate(length(min = 1, message = "Organization id is required"))]
    pub organization_id: String,

    #[validate(length(min = 1, max = 64, message = "Role must be 1-64 characters"))]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrganizationQuery {
    #[validate(length(min = 1, message = "Organization id is required"))]
    pub organization_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProvisionUserResponse {
    pub remote_uid: i64,
    pub remote_login: String,
    pub credential_kind: CredentialKind,
    pub credential: String,
    pub warnings: Vec<ProvisioningWarning>,
}

impl From<ProvisionOutcome> for ProvisionUserResponse {
    fn from(outcome: ProvisionOutcome) -> Self {
        Self {
            credential_kind: outcome.credential.kind(),
            credential: outcome.credential.expose().to_string(),
            remote_uid: outcome.remote_uid,
            remote_login: outcome.remote_login,
            warnings: outcome.warnings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserCredentialsResponse {
    pub database_name: String,
    pub remote_uid: i64,
    pub remote_login: String,
    pub credential_kind: CredentialKind,
    pub credential: String,
    pub warnings: Vec<ProvisioningWarning>,
}

impl From<UserCredentials> for UserCredentialsResponse {
    fn from(credentials: UserCredentials) -> Self {
        Self {
            credential_kind: credentials.credential.kind(),
            credential: credentials.credential.expose().to_string(),
            database_name: credentials.database_name,
            remote_uid: credentials.remote_uid,
            remote_login: credentials.remote_login,
            warnings: credentials.warnings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebLoginResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UserExistsResponse {
    pub exists: bool,
}

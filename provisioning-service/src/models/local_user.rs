//! Local user account, owned by the surrounding application.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct LocalUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    /// Application role; drives the ERP group policy when no role is given.
    pub role: Option<String>,
}

impl LocalUser {
    pub fn new(user_id: &str, email: &str, display_name: &str, role: Option<&str>) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: role.map(str::to_string),
        }
    }

    /// Login used for the mirrored ERP account.
    pub fn remote_login(&self) -> &str {
        &self.email
    }
}

//! Per-organization Odoo database connection settings.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct OdooDatabase {
    pub database_id: String,
    pub organization_id: String,
    pub base_url: String,
    pub database_name: String,
    pub admin_login: String,
    /// Vault ciphertext of the admin password.
    pub encrypted_admin_password: Vec<u8>,
}

impl OdooDatabase {
    /// Browser login page for `login`, preselecting this database.
    pub fn web_login_url(&self, login: &str) -> String {
        format!(
            "{}/web/login?db={}&login={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.database_name),
            urlencoding::encode(login)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(base_url: &str) -> OdooDatabase {
        OdooDatabase {
            database_id: "db-1".to_string(),
            organization_id: "org1".to_string(),
            base_url: base_url.to_string(),
            database_name: "acme prod".to_string(),
            admin_login: "admin".to_string(),
            encrypted_admin_password: Vec::new(),
        }
    }

    #[test]
    fn test_web_login_url_encodes_query() {
        let url = database("https://erp.example.com/").web_login_url("u1@example.com");
        assert_eq!(
            url,
            "https://erp.example.com/web/login?db=acme%20prod&login=u1%40example.com"
        );
    }
}

//! Durable proof that an ERP account was created for a local user.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per (local user, Odoo database). Written only after the remote
/// account exists and its password is set.
#[derive(Debug, Clone, FromRow)]
pub struct ProvisioningRecord {
    pub record_id: Uuid,
    pub local_user_id: String,
    pub odoo_database_id: String,
    pub remote_uid: i64,
    pub remote_login: String,
    pub encrypted_api_key: Option<Vec<u8>>,
    pub encrypted_password: Vec<u8>,
    pub is_active: bool,
    pub last_synced_at: DateTime<Utc>,
}

impl ProvisioningRecord {
    pub fn new(
        local_user_id: &str,
        odoo_database_id: &str,
        remote_uid: i64,
        remote_login: &str,
        encrypted_password: Vec<u8>,
        encrypted_api_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            local_user_id: local_user_id.to_string(),
            odoo_database_id: odoo_database_id.to_string(),
            remote_uid,
            remote_login: remote_login.to_string(),
            encrypted_api_key,
            encrypted_password,
            is_active: true,
            last_synced_at: Utc::now(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.encrypted_api_key.is_some()
    }
}

/// Partial update; `None` fields are left untouched. `last_synced_at` is
/// always refreshed by the repository.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningRecordPatch {
    pub encrypted_api_key: Option<Vec<u8>>,
    pub is_active: Option<bool>,
}

impl ProvisioningRecordPatch {
    pub fn api_key(encrypted_api_key: Vec<u8>) -> Self {
        Self {
            encrypted_api_key: Some(encrypted_api_key),
            ..Default::default()
        }
    }

    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Default::default()
        }
    }

    pub fn apply(&self, record: &mut ProvisioningRecord) {
        if let Some(key) = &self.encrypted_api_key {
            record.encrypted_api_key = Some(key.clone());
        }
        if let Some(is_active) = self.is_active {
            record.is_active = is_active;
        }
        record.last_synced_at = Utc::now();
    }
}

/// Forward progress of a provisioning saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Unprovisioned,
    RemoteUserResolved,
    PasswordSet,
    CredentialAcquired,
    Provisioned,
}

impl ProvisioningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::Unprovisioned => "unprovisioned",
            ProvisioningState::RemoteUserResolved => "remote_user_resolved",
            ProvisioningState::PasswordSet => "password_set",
            ProvisioningState::CredentialAcquired => "credential_acquired",
            ProvisioningState::Provisioned => "provisioned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut record = ProvisioningRecord::new("u1", "db-1", 42, "u1@example.com", vec![1], None);
        let before = record.last_synced_at;

        ProvisioningRecordPatch::active(false).apply(&mut record);
        assert!(!record.is_active);
        assert!(record.encrypted_api_key.is_none());
        assert!(record.last_synced_at >= before);

        ProvisioningRecordPatch::api_key(vec![9, 9]).apply(&mut record);
        assert_eq!(record.encrypted_api_key, Some(vec![9, 9]));
        assert!(!record.is_active);
    }
}

//! In-process repository for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::error::RepositoryError;
use super::repository::ProvisioningRepository;
use crate::models::{LocalUser, OdooDatabase, ProvisioningRecord, ProvisioningRecordPatch};

/// Enforces the same (local user, database) uniqueness as the SQL schema.
#[derive(Default)]
pub struct InMemoryProvisioningRepository {
    users: Mutex<HashMap<String, LocalUser>>,
    databases: Mutex<HashMap<String, OdooDatabase>>,
    records: Mutex<Vec<ProvisioningRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Storage(anyhow::anyhow!("in-memory store poisoned")))
}

impl InMemoryProvisioningRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local_user(&self, user: LocalUser) -> Result<(), RepositoryError> {
        lock(&self.users)?.insert(user.user_id.clone(), user);
        Ok(())
    }

    pub fn add_odoo_database(&self, database: OdooDatabase) -> Result<(), RepositoryError> {
        lock(&self.databases)?.insert(database.organization_id.clone(), database);
        Ok(())
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Result<Vec<ProvisioningRecord>, RepositoryError> {
        Ok(lock(&self.records)?.clone())
    }
}

#[async_trait]
impl ProvisioningRepository for InMemoryProvisioningRepository {
    async fn find_local_user(&self, user_id: &str) -> Result<Option<LocalUser>, RepositoryError> {
        Ok(lock(&self.users)?.get(user_id).cloned())
    }

    async fn find_odoo_database(
        &self,
        organization_id: &str,
    ) -> Result<Option<OdooDatabase>, RepositoryError> {
        Ok(lock(&self.databases)?.get(organization_id).cloned())
    }

    async fn find_provisioning_record(
        &self,
        local_user_id: &str,
        odoo_database_id: &str,
    ) -> Result<Option<ProvisioningRecord>, RepositoryError> {
        Ok(lock(&self.records)?
            .iter()
            .find(|r| r.local_user_id == local_user_id && r.odoo_database_id == odoo_database_id)
            .cloned())
    }

    async fn insert_provisioning_record(
        &self,
        record: &ProvisioningRecord,
    ) -> Result<(), RepositoryError> {
        let mut records = lock(&self.records)?;
        let duplicate = records.iter().any(|r| {
            r.local_user_id == record.local_user_id && r.odoo_database_id == record.odoo_database_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "provisioning record for user '{}' already exists",
                record.local_user_id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn update_provisioning_record(
        &self,
        record_id: uuid::Uuid,
        patch: &ProvisioningRecordPatch,
    ) -> Result<ProvisioningRecord, RepositoryError> {
        let mut records = lock(&self.records)?;
        let record = records
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("provisioning record {}", record_id)))?;
        patch.apply(record);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let repo = InMemoryProvisioningRepository::new();
        let first = ProvisioningRecord::new("u1", "db-1", 42, "u1@example.com", vec![1], None);
        let second = ProvisioningRecord::new("u1", "db-1", 42, "u1@example.com", vec![2], None);

        repo.insert_provisioning_record(&first).await.unwrap();
        let err = repo.insert_provisioning_record(&second).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(repo.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_scopes_by_database() {
        let repo = InMemoryProvisioningRepository::new();
        let record = ProvisioningRecord::new("u1", "db-1", 42, "u1@example.com", vec![1], None);
        repo.insert_provisioning_record(&record).await.unwrap();

        assert!(repo
            .find_provisioning_record("u1", "db-1")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_provisioning_record("u1", "db-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_record_is_not_found() {
        let repo = InMemoryProvisioningRepository::new();
        let err = repo
            .update_provisioning_record(uuid::Uuid::new_v4(), &ProvisioningRecordPatch::active(false))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }
}

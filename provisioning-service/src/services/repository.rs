//! Local persistence for users, Odoo databases and provisioning records.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use super::error::RepositoryError;
use crate::models::{LocalUser, OdooDatabase, ProvisioningRecord, ProvisioningRecordPatch};

#[async_trait]
pub trait ProvisioningRepository: Send + Sync {
    async fn find_local_user(&self, user_id: &str) -> Result<Option<LocalUser>, RepositoryError>;

    async fn find_odoo_database(
        &self,
        organization_id: &str,
    ) -> Result<Option<OdooDatabase>, RepositoryError>;

    /// The user's record in one Odoo database.
    async fn find_provisioning_record(
        &self,
        local_user_id: &str,
        odoo_database_id: &str,
    ) -> Result<Option<ProvisioningRecord>, RepositoryError>;

    /// Fails with `RepositoryError::Conflict` when a record already exists
    /// for the same (local user, database) pair.
    async fn insert_provisioning_record(
        &self,
        record: &ProvisioningRecord,
    ) -> Result<(), RepositoryError>;

    async fn update_provisioning_record(
        &self,
        record_id: uuid::Uuid,
        patch: &ProvisioningRecordPatch,
    ) -> Result<ProvisioningRecord, RepositoryError>;
}

const RECORD_COLUMNS: &str = "record_id, local_user_id, odoo_database_id, remote_uid, remote_login, encrypted_api_key, encrypted_password, is_active, last_synced_at";

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PgProvisioningRepository {
    pool: PgPool,
}

impl PgProvisioningRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(database_url))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, RepositoryError> {
        info!(max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))?;

        info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ProvisioningRepository for PgProvisioningRepository {
    async fn find_local_user(&self, user_id: &str) -> Result<Option<LocalUser>, RepositoryError> {
        sqlx::query_as::<_, LocalUser>(
            "SELECT user_id, email, display_name, role FROM local_users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Storage(anyhow::anyhow!("Failed to load user: {}", e)))
    }

    async fn find_odoo_database(
        &self,
        organization_id: &str,
    ) -> Result<Option<OdooDatabase>, RepositoryError> {
        sqlx::query_as::<_, OdooDatabase>(
            r#"
            SELECT database_id, organization_id, base_url, database_name, admin_login, encrypted_admin_password
            FROM odoo_databases
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryError::Storage(anyhow::anyhow!("Failed to load Odoo database: {}", e))
        })
    }

    async fn find_provisioning_record(
        &self,
        local_user_id: &str,
        odoo_database_id: &str,
    ) -> Result<Option<ProvisioningRecord>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM provisioning_records
            WHERE local_user_id = $1 AND odoo_database_id = $2
            "#
        );
        sqlx::query_as::<_, ProvisioningRecord>(&query)
            .bind(local_user_id)
            .bind(odoo_database_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryError::Storage(anyhow::anyhow!(
                    "Failed to load provisioning record: {}",
                    e
                ))
            })
    }

    async fn insert_provisioning_record(
        &self,
        record: &ProvisioningRecord,
    ) -> Result<(), RepositoryError> {
        let query = format!(
            "INSERT INTO provisioning_records ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&query)
            .bind(record.record_id)
            .bind(&record.local_user_id)
            .bind(&record.odoo_database_id)
            .bind(record.remote_uid)
            .bind(&record.remote_login)
            .bind(&record.encrypted_api_key)
            .bind(&record.encrypted_password)
            .bind(record.is_active)
            .bind(record.last_synced_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    RepositoryError::Conflict(format!(
                        "provisioning record for user '{}' already exists",
                        record.local_user_id
                    ))
                }
                _ => RepositoryError::Storage(anyhow::anyhow!(
                    "Failed to insert provisioning record: {}",
                    e
                )),
            })?;

        info!(
            record_id = %record.record_id,
            local_user_id = %record.local_user_id,
            remote_uid = record.remote_uid,
            "Provisioning record inserted"
        );
        Ok(())
    }

    async fn update_provisioning_record(
        &self,
        record_id: uuid::Uuid,
        patch: &ProvisioningRecordPatch,
    ) -> Result<ProvisioningRecord, RepositoryError> {
        let query = format!(
            r#"
            UPDATE provisioning_records
            SET encrypted_api_key = COALESCE($2, encrypted_api_key),
                is_active = COALESCE($3, is_active),
                last_synced_at = $4
            WHERE record_id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ProvisioningRecord>(&query)
            .bind(record_id)
            .bind(&patch.encrypted_api_key)
            .bind(patch.is_active)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryError::Storage(anyhow::anyhow!(
                    "Failed to update provisioning record: {}",
                    e
                ))
            })?
            .ok_or_else(|| RepositoryError::NotFound(format!("provisioning record {}", record_id)))
    }
}

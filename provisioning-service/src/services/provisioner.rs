//! Provision and deactivate Odoo accounts mirroring local users.
//!
//! Remote mutation always precedes local persistence: a `ProvisioningRecord`
//! is written only once the remote account exists with a known password, and
//! a local deactivation is written only after the remote one succeeded.

use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::api_key::ApiKeyIssuer;
use super::error::ProvisioningError;
use super::groups::{GroupPolicy, GroupResolver};
use super::odoo::{OdooApi, OdooUsers, RemoteCallExecutor, SessionAuthenticator, SessionRetryPolicy};
use super::repository::ProvisioningRepository;
use super::saga::SagaFailure;
use super::steps::{deactivation_saga, provision_saga, DeactivationContext, ProvisionContext};
use super::vault::CredentialVault;
use crate::config::OdooSettings;
use crate::models::{
    AdminCredentials, Credential, OdooDatabase, ProvisionOutcome, ProvisioningRecord,
    ProvisioningRecordPatch, ProvisioningWarning, UserCredentials,
};

const DEFAULT_ROLE: &str = "user";

pub struct UserProvisioner {
    pub(crate) repository: Arc<dyn ProvisioningRepository>,
    pub(crate) vault: Arc<dyn CredentialVault>,
    pub(crate) authenticator: SessionAuthenticator,
    pub(crate) users: OdooUsers,
    pub(crate) groups: GroupResolver,
    pub(crate) api_keys: ApiKeyIssuer,
}

impl UserProvisioner {
    pub fn new(
        api: Arc<dyn OdooApi>,
        repository: Arc<dyn ProvisioningRepository>,
        vault: Arc<dyn CredentialVault>,
        policy: GroupPolicy,
        settings: &OdooSettings,
    ) -> Self {
        let executor = Arc::new(RemoteCallExecutor::new(
            api.clone(),
            SessionRetryPolicy::default(),
        ));

        Self {
            repository,
            vault,
            authenticator: executor.authenticator().clone(),
            users: OdooUsers::new(executor.clone()),
            groups: GroupResolver::new(executor, policy),
            api_keys: ApiKeyIssuer::new(api, settings),
        }
    }

    /// Ensure `local_user_id` has an Odoo account in the organization's
    /// database. Calling it again for a provisioned user makes no remote
    /// user mutation beyond an optional API key upgrade.
    #[instrument(skip(self), fields(local_user_id = %local_user_id, organization_id = %organization_id))]
    pub async fn provision_user(
        &self,
        local_user_id: &str,
        organization_id: &str,
        role: Option<&str>,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let user = self
            .repository
            .find_local_user(local_user_id)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound(format!("local user '{}'", local_user_id)))?;

        let database = self
            .repository
            .find_odoo_database(organization_id)
            .await?
            .ok_or_else(|| no_database(organization_id))?;
        let existing = self
            .repository
            .find_provisioning_record(local_user_id, &database.database_id)
            .await?;

        if let Some(record) = existing {
            info!(remote_uid = record.remote_uid, "User already provisioned");
            let (record, warnings) = self.ensure_api_key(record, &database).await;
            return Ok(ProvisionOutcome {
                credential: self.best_credential(&record)?,
                remote_uid: record.remote_uid,
                remote_login: record.remote_login,
                warnings,
            });
        }

        let admin = self.admin_credentials(&database)?;
        let role = role
            .or(user.role.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string();

        info!(role = %role, database = %database.database_name, "Provisioning remote account");

        let mut ctx = ProvisionContext::new(self, &admin, &database, &user, role);
        provision_saga()
            .run(&mut ctx)
            .await
            .map_err(|failure| report("provision_user", failure))?;

        let record = ctx.record.take().ok_or_else(|| {
            ProvisioningError::Storage(anyhow::anyhow!("provisioning finished without a record"))
        })?;

        let credential = if ctx.adopted_record {
            self.best_credential(&record)?
        } else {
            match (ctx.api_key.take(), ctx.password.take()) {
                (Some(key), _) => Credential::ApiKey(key),
                (None, Some(password)) => Credential::Password(password),
                (None, None) => self.best_credential(&record)?,
            }
        };

        info!(
            remote_uid = record.remote_uid,
            credential_kind = ?credential.kind(),
            warnings = ctx.warnings.len(),
            "User provisioned"
        );

        Ok(ProvisionOutcome {
            remote_uid: record.remote_uid,
            remote_login: record.remote_login,
            credential,
            warnings: ctx.warnings,
        })
    }

    /// Deactivate remotely, then locally. A failed local write reactivates
    /// the remote account before the error is returned.
    #[instrument(skip(self), fields(local_user_id = %local_user_id, organization_id = %organization_id))]
    pub async fn deactivate_user(
        &self,
        local_user_id: &str,
        organization_id: &str,
    ) -> Result<(), ProvisioningError> {
        let database = self
            .repository
            .find_odoo_database(organization_id)
            .await?
            .ok_or_else(|| no_database(organization_id))?;
        let admin = self.admin_credentials(&database)?;

        let Some(record) = self
            .repository
            .find_provisioning_record(local_user_id, &database.database_id)
            .await?
        else {
            info!("No provisioning record, nothing to deactivate");
            return Ok(());
        };

        if !record.is_active {
            info!(remote_uid = record.remote_uid, "Already inactive");
            return Ok(());
        }

        let mut ctx = DeactivationContext {
            provisioner: self,
            admin: &admin,
            record: &record,
        };
        deactivation_saga()
            .run(&mut ctx)
            .await
            .map_err(|failure| report("deactivate_user", failure))?;

        info!(remote_uid = record.remote_uid, "User deactivated");
        Ok(())
    }

    /// Stored credentials, upgraded to an API key when possible. `None` when
    /// the user is not provisioned in the organization's database.
    #[instrument(skip(self), fields(local_user_id = %local_user_id, organization_id = %organization_id))]
    pub async fn get_user_credentials(
        &self,
        local_user_id: &str,
        organization_id: &str,
    ) -> Result<Option<UserCredentials>, ProvisioningError> {
        let Some(database) = self.repository.find_odoo_database(organization_id).await? else {
            return Ok(None);
        };
        let Some(record) = self
            .repository
            .find_provisioning_record(local_user_id, &database.database_id)
            .await?
        else {
            return Ok(None);
        };

        let (record, warnings) = self.ensure_api_key(record, &database).await;
        Ok(Some(UserCredentials {
            database_name: database.database_name.clone(),
            credential: self.best_credential(&record)?,
            remote_uid: record.remote_uid,
            remote_login: record.remote_login,
            warnings,
        }))
    }

    #[instrument(skip(self), fields(local_user_id = %local_user_id, organization_id = %organization_id))]
    pub async fn get_web_login_url(
        &self,
        local_user_id: &str,
        organization_id: &str,
    ) -> Result<String, ProvisioningError> {
        let database = self
            .repository
            .find_odoo_database(organization_id)
            .await?
            .ok_or_else(|| no_database(organization_id))?;
        let record = self
            .repository
            .find_provisioning_record(local_user_id, &database.database_id)
            .await?
            .ok_or_else(|| {
                ProvisioningError::NotFound(format!(
                    "provisioning record for user '{}'",
                    local_user_id
                ))
            })?;

        let (record, _) = self.ensure_api_key(record, &database).await;
        Ok(database.web_login_url(&record.remote_login))
    }

    pub async fn user_exists(
        &self,
        local_user_id: &str,
        organization_id: &str,
    ) -> Result<bool, ProvisioningError> {
        let Some(database) = self.repository.find_odoo_database(organization_id).await? else {
            return Ok(false);
        };
        Ok(self
            .repository
            .find_provisioning_record(local_user_id, &database.database_id)
            .await?
            .is_some())
    }

    fn admin_credentials(&self, database: &OdooDatabase) -> Result<AdminCredentials, ProvisioningError> {
        Ok(AdminCredentials {
            base_url: database.base_url.clone(),
            database_name: database.database_name.clone(),
            admin_login: database.admin_login.clone(),
            admin_password: self.vault.decrypt(&database.encrypted_admin_password)?,
        })
    }

    /// API key when stored, otherwise the password.
    fn best_credential(&self, record: &ProvisioningRecord) -> Result<Credential, ProvisioningError> {
        match &record.encrypted_api_key {
            Some(sealed) => Ok(Credential::ApiKey(self.vault.decrypt(sealed)?)),
            None => Ok(Credential::Password(
                self.vault.decrypt(&record.encrypted_password)?,
            )),
        }
    }

    /// Lazily add an API key to an active record that lacks one. Never fails:
    /// a failed upgrade leaves the record untouched and yields a warning.
    async fn ensure_api_key(
        &self,
        record: ProvisioningRecord,
        database: &OdooDatabase,
    ) -> (ProvisioningRecord, Vec<ProvisioningWarning>) {
        if record.has_api_key() || !record.is_active {
            return (record, Vec::new());
        }

        match self.upgrade_credential(&record, database).await {
            Ok(upgraded) => (upgraded, Vec::new()),
            Err(warning) => (record, vec![warning]),
        }
    }

    async fn upgrade_credential(
        &self,
        record: &ProvisioningRecord,
        database: &OdooDatabase,
    ) -> Result<ProvisioningRecord, ProvisioningWarning> {
        let upgrade_failed = |reason: String| {
            warn!(remote_uid = record.remote_uid, reason = %reason, "Credential upgrade failed");
            ProvisioningWarning::CredentialUpgradeFailed { reason }
        };

        let admin = self
            .admin_credentials(database)
            .map_err(|e| upgrade_failed(e.to_string()))?;
        let session = self
            .authenticator
            .authenticate(&admin)
            .await
            .map_err(|e| upgrade_failed(e.to_string()))?;

        let key = self.api_keys.issue(&session, record.remote_uid).await?;
        let sealed = self
            .vault
            .encrypt(key.expose_secret())
            .map_err(|e| upgrade_failed(e.to_string()))?;

        let upgraded = self
            .repository
            .update_provisioning_record(record.record_id, &ProvisioningRecordPatch::api_key(sealed))
            .await
            .map_err(|e| upgrade_failed(e.to_string()))?;

        info!(remote_uid = record.remote_uid, "Stored credential upgraded to API key");
        Ok(upgraded)
    }
}

fn no_database(organization_id: &str) -> ProvisioningError {
    ProvisioningError::NotFound(format!(
        "Odoo database for organization '{}'",
        organization_id
    ))
}

fn report(saga: &'static str, failure: SagaFailure) -> ProvisioningError {
    if !failure.compensation_failures.is_empty() {
        error!(
            saga,
            step = failure.step,
            failures = failure.compensation_failures.len(),
            manual_intervention_required = true,
            "Saga left remote state inconsistent"
        );
    }
    failure.into_error()
}

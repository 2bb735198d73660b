//! Saga steps for provisioning and deactivating one remote account.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use tracing::{debug, info, warn};

use super::error::{ProvisioningError, RepositoryError};
use super::odoo::signatures::is_uniqueness_violation;
use super::odoo::{NewRemoteUser, RemoteSession, RemoteUser};
use super::password::generate_password;
use super::provisioner::UserProvisioner;
use super::saga::{Saga, SagaStep};
use crate::models::{
    AdminCredentials, LocalUser, OdooDatabase, ProvisioningRecord, ProvisioningRecordPatch,
    ProvisioningState, ProvisioningWarning,
};

/// Working state of one `provision_user` saga run.
pub(crate) struct ProvisionContext<'a> {
    pub provisioner: &'a UserProvisioner,
    pub admin: &'a AdminCredentials,
    pub database: &'a OdooDatabase,
    pub user: &'a LocalUser,
    pub role: String,
    pub state: ProvisioningState,
    pub session: Option<RemoteSession>,
    pub remote_uid: Option<i64>,
    /// Whether this run created or reactivated the remote account, and so
    /// owns rolling it back.
    pub owns_activation: bool,
    pub password: Option<Secret<String>>,
    pub api_key: Option<Secret<String>>,
    pub record: Option<ProvisioningRecord>,
    /// Set when a concurrent run persisted first and its record was adopted.
    pub adopted_record: bool,
    pub warnings: Vec<ProvisioningWarning>,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        provisioner: &'a UserProvisioner,
        admin: &'a AdminCredentials,
        database: &'a OdooDatabase,
        user: &'a LocalUser,
        role: String,
    ) -> Self {
        Self {
            provisioner,
            admin,
            database,
            user,
            role,
            state: ProvisioningState::Unprovisioned,
            session: None,
            remote_uid: None,
            owns_activation: false,
            password: None,
            api_key: None,
            record: None,
            adopted_record: false,
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, state: ProvisioningState) {
        debug!(
            local_user_id = %self.user.user_id,
            from = self.state.as_str(),
            to = state.as_str(),
            "Provisioning state advanced"
        );
        self.state = state;
    }
}

fn missing(what: &str) -> ProvisioningError {
    ProvisioningError::RemoteOperationFailed(format!("saga invariant broken: no {}", what))
}

pub(crate) fn provision_saga<'a>() -> Saga<ProvisionContext<'a>> {
    Saga::new("provision_user")
        .step(ResolveRemoteUser)
        .step(AssignGroups)
        .step(SetPassword)
        .step(AcquireApiKey)
        .step(PersistRecord)
}

/// Find the account by login or create it; adopt the winner of a create race.
struct ResolveRemoteUser;

impl ResolveRemoteUser {
    /// Adopted accounts left archived are reactivated.
    async fn adopt(
        ctx: &mut ProvisionContext<'_>,
        session: &mut RemoteSession,
        existing: RemoteUser,
    ) -> Result<i64, ProvisioningError> {
        if !existing.active {
            ctx.provisioner
                .users
                .set_active(session, existing.id, true, ctx.admin)
                .await?;
            ctx.owns_activation = true;
            info!(remote_uid = existing.id, "Reactivated archived remote account");
        } else {
            info!(remote_uid = existing.id, "Adopted existing remote account");
        }
        Ok(existing.id)
    }
}

#[async_trait]
impl<'a> SagaStep<ProvisionContext<'a>> for ResolveRemoteUser {
    fn name(&self) -> &'static str {
        "resolve_remote_user"
    }

    async fn execute(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let provisioner = ctx.provisioner;
        let admin = ctx.admin;
        let user = ctx.user;
        let login = user.remote_login();

        let mut session = provisioner.authenticator.authenticate(admin).await?;

        let uid = match provisioner
            .users
            .find_by_login(&mut session, login, admin)
            .await?
        {
            Some(existing) => Self::adopt(ctx, &mut session, existing).await?,
            None => {
                let new_user = NewRemoteUser {
                    name: &user.display_name,
                    login,
                    email: &user.email,
                };
                match provisioner.users.create(&mut session, &new_user, admin).await {
                    Ok(uid) => {
                        ctx.owns_activation = true;
                        info!(remote_uid = uid, login = %login, "Created remote account");
                        uid
                    }
                    Err(err) if err.remote_message().is_some_and(is_uniqueness_violation) => {
                        warn!(login = %login, error = %err, "Login taken concurrently, re-querying");
                        match provisioner
                            .users
                            .find_by_login(&mut session, login, admin)
                            .await?
                        {
                            Some(winner) => Self::adopt(ctx, &mut session, winner).await?,
                            None => return Err(err),
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        ctx.session = Some(session);
        ctx.remote_uid = Some(uid);
        ctx.advance(ProvisioningState::RemoteUserResolved);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let Some(uid) = ctx.remote_uid.filter(|_| ctx.owns_activation) else {
            return Ok(());
        };

        let provisioner = ctx.provisioner;
        let mut session = provisioner.authenticator.authenticate(ctx.admin).await?;
        provisioner
            .users
            .set_active(&mut session, uid, false, ctx.admin)
            .await?;

        warn!(remote_uid = uid, "Remote account deactivated by compensation");
        ctx.session = Some(session);
        Ok(())
    }
}

/// Resolve the role's groups and link them. Individual misses are warnings;
/// a failed write aborts the saga.
struct AssignGroups;

#[async_trait]
impl<'a> SagaStep<ProvisionContext<'a>> for AssignGroups {
    fn name(&self) -> &'static str {
        "assign_groups"
    }

    async fn execute(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let provisioner = ctx.provisioner;
        let admin = ctx.admin;
        let uid = ctx.remote_uid.ok_or_else(|| missing("remote uid"))?;
        let session = ctx.session.as_mut().ok_or_else(|| missing("session"))?;

        let names = provisioner.groups.policy().group_names_for(&ctx.role);
        let resolution = provisioner.groups.resolve_groups(session, &names, admin).await;

        if !resolution.group_ids.is_empty() {
            provisioner
                .users
                .add_groups(session, uid, &resolution.group_ids, admin)
                .await?;
        }

        info!(
            remote_uid = uid,
            role = %ctx.role,
            assigned = resolution.group_ids.len(),
            skipped = resolution.warnings.len(),
            "Groups assigned"
        );
        ctx.warnings.extend(resolution.warnings);
        Ok(())
    }
}

struct SetPassword;

#[async_trait]
impl<'a> SagaStep<ProvisionContext<'a>> for SetPassword {
    fn name(&self) -> &'static str {
        "set_password"
    }

    async fn execute(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let provisioner = ctx.provisioner;
        let admin = ctx.admin;
        let uid = ctx.remote_uid.ok_or_else(|| missing("remote uid"))?;
        let session = ctx.session.as_mut().ok_or_else(|| missing("session"))?;

        let password = generate_password();
        provisioner
            .users
            .set_password(session, uid, &password, admin)
            .await?;

        ctx.password = Some(password);
        ctx.advance(ProvisioningState::PasswordSet);
        Ok(())
    }
}

/// Prefer an API key; on failure keep going with the password.
struct AcquireApiKey;

#[async_trait]
impl<'a> SagaStep<ProvisionContext<'a>> for AcquireApiKey {
    fn name(&self) -> &'static str {
        "acquire_api_key"
    }

    async fn execute(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let uid = ctx.remote_uid.ok_or_else(|| missing("remote uid"))?;
        let session = ctx.session.as_ref().ok_or_else(|| missing("session"))?;

        match ctx.provisioner.api_keys.issue(session, uid).await {
            Ok(key) => ctx.api_key = Some(key),
            Err(warning) => ctx.warnings.push(warning),
        }

        ctx.advance(ProvisioningState::CredentialAcquired);
        Ok(())
    }
}

/// Encrypt and write the record; adopt a concurrently written one.
struct PersistRecord;

impl PersistRecord {
    /// Concurrent runs each set their own password, so the remote account may
    /// hold a different one than the adopted record. Without an API key the
    /// stored password is the only credential, so it is written back.
    async fn restore_stored_password(
        ctx: &mut ProvisionContext<'_>,
        record: &ProvisioningRecord,
    ) -> Result<(), ProvisioningError> {
        let provisioner = ctx.provisioner;
        let admin = ctx.admin;
        let stored = provisioner.vault.decrypt(&record.encrypted_password)?;
        let session = ctx.session.as_mut().ok_or_else(|| missing("session"))?;

        provisioner
            .users
            .set_password(session, record.remote_uid, &stored, admin)
            .await?;

        info!(remote_uid = record.remote_uid, "Remote password aligned with adopted record");
        Ok(())
    }
}

#[async_trait]
impl<'a> SagaStep<ProvisionContext<'a>> for PersistRecord {
    fn name(&self) -> &'static str {
        "persist_record"
    }

    async fn execute(&self, ctx: &mut ProvisionContext<'a>) -> Result<(), ProvisioningError> {
        let provisioner = ctx.provisioner;
        let uid = ctx.remote_uid.ok_or_else(|| missing("remote uid"))?;
        let password = ctx.password.as_ref().ok_or_else(|| missing("password"))?;

        let encrypted_password = provisioner.vault.encrypt(password.expose_secret())?;
        let encrypted_api_key = ctx
            .api_key
            .as_ref()
            .map(|key| provisioner.vault.encrypt(key.expose_secret()))
            .transpose()?;

        let record = ProvisioningRecord::new(
            &ctx.user.user_id,
            &ctx.database.database_id,
            uid,
            ctx.user.remote_login(),
            encrypted_password,
            encrypted_api_key,
        );

        match provisioner.repository.insert_provisioning_record(&record).await {
            Ok(()) => {
                info!(record_id = %record.record_id, remote_uid = uid, "Provisioning record stored");
                ctx.record = Some(record);
            }
            Err(RepositoryError::Conflict(reason)) => {
                let existing = provisioner
                    .repository
                    .find_provisioning_record(&ctx.user.user_id, &ctx.database.database_id)
                    .await?
                    .ok_or_else(|| {
                        ProvisioningError::Storage(anyhow::anyhow!(
                            "record conflict for '{}' but no record found: {}",
                            ctx.user.user_id,
                            reason
                        ))
                    })?;
                info!(
                    record_id = %existing.record_id,
                    remote_uid = existing.remote_uid,
                    "Provisioning record written concurrently, adopting"
                );
                // The adopted record now owns the remote account; never roll it back.
                ctx.owns_activation = false;
                if !existing.has_api_key() {
                    Self::restore_stored_password(ctx, &existing).await?;
                }
                ctx.record = Some(existing);
                ctx.adopted_record = true;
            }
            Err(err) => return Err(err.into()),
        }

        ctx.advance(ProvisioningState::Provisioned);
        Ok(())
    }
}

/// Working state of one `deactivate_user` saga run.
pub(crate) struct DeactivationContext<'a> {
    pub provisioner: &'a UserProvisioner,
    pub admin: &'a AdminCredentials,
    pub record: &'a ProvisioningRecord,
}

pub(crate) fn deactivation_saga<'a>() -> Saga<DeactivationContext<'a>> {
    Saga::new("deactivate_user")
        .step(RemoteDeactivate)
        .step(LocalDeactivate)
}

struct RemoteDeactivate;

#[async_trait]
impl<'a> SagaStep<DeactivationContext<'a>> for RemoteDeactivate {
    fn name(&self) -> &'static str {
        "remote_deactivate"
    }

    async fn execute(&self, ctx: &mut DeactivationContext<'a>) -> Result<(), ProvisioningError> {
        let users = &ctx.provisioner.users;
        let mut session = ctx.provisioner.authenticator.authenticate(ctx.admin).await?;
        users
            .set_active(&mut session, ctx.record.remote_uid, false, ctx.admin)
            .await?;
        info!(remote_uid = ctx.record.remote_uid, "Remote account deactivated");
        Ok(())
    }

    async fn compensate(&self, ctx: &mut DeactivationContext<'a>) -> Result<(), ProvisioningError> {
        let users = &ctx.provisioner.users;
        let mut session = ctx.provisioner.authenticator.authenticate(ctx.admin).await?;
        users
            .set_active(&mut session, ctx.record.remote_uid, true, ctx.admin)
            .await?;
        warn!(remote_uid = ctx.record.remote_uid, "Remote account reactivated by compensation");
        Ok(())
    }
}

struct LocalDeactivate;

#[async_trait]
impl<'a> SagaStep<DeactivationContext<'a>> for LocalDeactivate {
    fn name(&self) -> &'static str {
        "local_deactivate"
    }

    async fn execute(&self, ctx: &mut DeactivationContext<'a>) -> Result<(), ProvisioningError> {
        ctx.provisioner
            .repository
            .update_provisioning_record(ctx.record.record_id, &ProvisioningRecordPatch::active(false))
            .await?;
        Ok(())
    }
}

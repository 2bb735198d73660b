#![allow(dead_code)]

use async_trait::async_trait;
use provisioning_service::config::OdooSettings;
use provisioning_service::models::{
    LocalUser, OdooDatabase, ProvisioningRecord, ProvisioningRecordPatch,
};
use provisioning_service::services::odoo::{
    ApiKeyRequest, ApiKeyResult, AuthenticateResponse, OdooApi, RemoteSession,
};
use provisioning_service::services::{
    AesGcmVault, CredentialVault, GroupPolicy, InMemoryProvisioningRepository, ProvisioningError,
    ProvisioningRepository, RepositoryError, UserProvisioner,
};
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const ORG_ID: &str = "org1";
pub const DATABASE_ID: &str = "db-1";
pub const DATABASE_NAME: &str = "acme";
pub const BASE_URL: &str = "http://odoo.test";
pub const ADMIN_LOGIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const USER_ID: &str = "u1";
pub const USER_EMAIL: &str = "u1@example.com";
pub const FIRST_REMOTE_UID: i64 = 42;
pub const VAULT_KEY: [u8; 32] = [7u8; 32];

pub const SESSION_EXPIRED: &str = "Session expired (odoo.http.SessionExpiredException)";

#[derive(Debug, Clone)]
pub struct FakeUser {
    pub login: String,
    pub name: String,
    pub active: bool,
    pub groups: Vec<i64>,
    pub password: Option<String>,
}

impl FakeUser {
    pub fn archived(login: &str) -> Self {
        Self {
            login: login.to_string(),
            name: login.to_string(),
            active: false,
            groups: Vec::new(),
            password: None,
        }
    }
}

pub struct FakeState {
    pub users: BTreeMap<i64, FakeUser>,
    pub next_uid: i64,
    /// `module.identifier` to group id.
    pub groups: HashMap<String, i64>,
    pub sessions: HashSet<String>,
    pub session_counter: u64,
    /// Fail this many upcoming `call_kw` calls with a session-expiry error.
    pub expire_next: u32,
    /// `res.users.write` fields that are rejected.
    pub fail_writes: HashSet<&'static str>,
    pub api_key_error: Option<String>,
    pub calls: Vec<String>,
}

/// In-process Odoo enforcing login uniqueness, with failure injection.
///
/// Every call yields first so concurrent sagas interleave.
pub struct FakeOdoo {
    state: Mutex<FakeState>,
}

impl FakeOdoo {
    pub fn new() -> Self {
        let policy = GroupPolicy::default();
        let mut names: Vec<String> = policy
            .base
            .iter()
            .chain(policy.roles.values().flatten())
            .cloned()
            .collect();
        names.sort();
        names.dedup();

        Self {
            state: Mutex::new(FakeState {
                users: BTreeMap::new(),
                next_uid: FIRST_REMOTE_UID,
                groups: names
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| (name, 100 + i as i64))
                    .collect(),
                sessions: HashSet::new(),
                session_counter: 0,
                expire_next: 0,
                fail_writes: HashSet::new(),
                api_key_error: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn user(&self, uid: i64) -> Option<FakeUser> {
        self.with_state(|s| s.users.get(&uid).cloned())
    }

    pub fn user_by_login(&self, login: &str) -> Option<(i64, FakeUser)> {
        self.with_state(|s| {
            s.users
                .iter()
                .find(|(_, u)| u.login == login)
                .map(|(id, u)| (*id, u.clone()))
        })
    }

    pub fn group_id(&self, name: &str) -> i64 {
        self.with_state(|s| s.groups[name])
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn seed_user(&self, user: FakeUser) -> i64 {
        self.with_state(|s| {
            let uid = s.next_uid;
            s.next_uid += 1;
            s.users.insert(uid, user);
            uid
        })
    }

    fn check_session(state: &mut FakeState, session: &RemoteSession) -> Result<(), ProvisioningError> {
        if state.expire_next > 0 {
            state.expire_next -= 1;
            return Err(ProvisioningError::RemoteOperationFailed(SESSION_EXPIRED.to_string()));
        }
        match &session.session_id {
            Some(id) if state.sessions.contains(id) => Ok(()),
            _ => Err(ProvisioningError::RemoteOperationFailed(SESSION_EXPIRED.to_string())),
        }
    }

    fn dispatch(
        state: &mut FakeState,
        model: &str,
        method: &str,
        args: &Value,
    ) -> Result<Value, ProvisioningError> {
        let remote = |msg: &str| ProvisioningError::RemoteOperationFailed(msg.to_string());

        match (model, method) {
            ("res.users", "search_read") => {
                let login = args[0][0][2].as_str().unwrap_or_default();
                let found: Vec<Value> = state
                    .users
                    .iter()
                    .filter(|(_, u)| u.login == login)
                    .map(|(id, u)| json!({"id": id, "active": u.active}))
                    .collect();
                Ok(json!(found))
            }
            ("res.users", "create") => {
                let vals = &args[0];
                let login = vals["login"].as_str().unwrap_or_default().to_string();
                if state.users.values().any(|u| u.login == login) {
                    return Err(remote("You can not have two users with the same login !"));
                }
                let uid = state.next_uid;
                state.next_uid += 1;
                state.users.insert(
                    uid,
                    FakeUser {
                        login,
                        name: vals["name"].as_str().unwrap_or_default().to_string(),
                        active: true,
                        groups: Vec::new(),
                        password: None,
                    },
                );
                Ok(json!(uid))
            }
            ("res.users", "write") => {
                let uid = args[0][0].as_i64().unwrap_or_default();
                let vals = args[1].as_object().cloned().unwrap_or_default();
                if vals.keys().any(|k| state.fail_writes.contains(k.as_str())) {
                    return Err(remote("Access error: write rejected"));
                }
                let user = state
                    .users
                    .get_mut(&uid)
                    .ok_or_else(|| remote("Record does not exist or has been deleted"))?;
                if let Some(active) = vals.get("active").and_then(Value::as_bool) {
                    user.active = active;
                }
                if let Some(password) = vals.get("password").and_then(Value::as_str) {
                    user.password = Some(password.to_string());
                }
                if let Some(links) = vals.get("groups_id").and_then(Value::as_array) {
                    for link in links {
                        let gid = link[1].as_i64().unwrap_or_default();
                        if !user.groups.contains(&gid) {
                            user.groups.push(gid);
                        }
                    }
                }
                Ok(json!(true))
            }
            ("ir.model.data", "search_read") => {
                let module = args[0][0][2].as_str().unwrap_or_default();
                let name = args[0][1][2].as_str().unwrap_or_default();
                let found = state
                    .groups
                    .get(&format!("{}.{}", module, name))
                    .map(|gid| vec![json!({"id": 1, "res_id": gid})])
                    .unwrap_or_default();
                Ok(json!(found))
            }
            _ => Err(remote("unsupported call")),
        }
    }
}

#[async_trait]
impl OdooApi for FakeOdoo {
    async fn authenticate(
        &self,
        _base_url: &str,
        database: &str,
        login: &str,
        password: &Secret<String>,
    ) -> Result<AuthenticateResponse, ProvisioningError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push("authenticate".to_string());

        if database != DATABASE_NAME
            || login != ADMIN_LOGIN
            || password.expose_secret() != ADMIN_PASSWORD
        {
            return Err(ProvisioningError::AuthenticationFailed(
                "Access Denied".to_string(),
            ));
        }

        state.session_counter += 1;
        let session_id = format!("sess-{}", state.session_counter);
        state.sessions.insert(session_id.clone());

        Ok(AuthenticateResponse {
            uid: Some(2),
            session_id: Some(session_id.clone()),
            cookies: vec![format!("session_id={}", session_id)],
        })
    }

    async fn call_kw(
        &self,
        session: &RemoteSession,
        model: &str,
        method: &str,
        args: Value,
        _kwargs: Value,
    ) -> Result<Value, ProvisioningError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();

        let name = match (model, method) {
            ("res.users", "write") => {
                let mut fields: Vec<String> = args[1]
                    .as_object()
                    .map(|vals| vals.keys().cloned().collect())
                    .unwrap_or_default();
                fields.sort();
                format!("res.users.write:{}", fields.join(","))
            }
            _ => format!("{}.{}", model, method),
        };
        state.calls.push(name);

        Self::check_session(&mut state, session)?;
        Self::dispatch(&mut state, model, method, &args)
    }

    async fn generate_api_key(
        &self,
        session: &RemoteSession,
        request: &ApiKeyRequest,
    ) -> Result<ApiKeyResult, ProvisioningError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push("api_key".to_string());
        Self::check_session(&mut state, session)?;

        Ok(match &state.api_key_error {
            Some(error) => ApiKeyResult {
                ok: false,
                error: Some(error.clone()),
                ..Default::default()
            },
            None => ApiKeyResult {
                ok: true,
                token: Some(Secret::new(format!("key-{}", request.user_id))),
                id: Some(request.user_id),
                error: None,
            },
        })
    }
}

/// In-memory repository with switchable write failures.
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryProvisioningRepository,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl FlakyRepository {
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ProvisioningRecord> {
        self.inner.records().unwrap()
    }
}

#[async_trait]
impl ProvisioningRepository for FlakyRepository {
    async fn find_local_user(&self, user_id: &str) -> Result<Option<LocalUser>, RepositoryError> {
        self.inner.find_local_user(user_id).await
    }

    async fn find_odoo_database(
        &self,
        organization_id: &str,
    ) -> Result<Option<OdooDatabase>, RepositoryError> {
        self.inner.find_odoo_database(organization_id).await
    }

    async fn find_provisioning_record(
        &self,
        local_user_id: &str,
        odoo_database_id: &str,
    ) -> Result<Option<ProvisioningRecord>, RepositoryError> {
        self.inner
            .find_provisioning_record(local_user_id, odoo_database_id)
            .await
    }

    async fn insert_provisioning_record(
        &self,
        record: &ProvisioningRecord,
    ) -> Result<(), RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage(anyhow::anyhow!("disk full")));
        }
        self.inner.insert_provisioning_record(record).await
    }

    async fn update_provisioning_record(
        &self,
        record_id: uuid::Uuid,
        patch: &ProvisioningRecordPatch,
    ) -> Result<ProvisioningRecord, RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage(anyhow::anyhow!("connection reset")));
        }
        self.inner.update_provisioning_record(record_id, patch).await
    }
}

pub struct Harness {
    pub odoo: Arc<FakeOdoo>,
    pub repository: Arc<FlakyRepository>,
    pub vault: Arc<AesGcmVault>,
    pub provisioner: Arc<UserProvisioner>,
}

impl Harness {
    /// One organization with an Odoo database and one local user without a role.
    pub fn new() -> Self {
        let odoo = Arc::new(FakeOdoo::new());
        let repository = Arc::new(FlakyRepository::default());
        let vault = Arc::new(AesGcmVault::new(&VAULT_KEY).unwrap());

        repository
            .inner
            .add_local_user(LocalUser::new(USER_ID, USER_EMAIL, "User One", None))
            .unwrap();
        repository
            .inner
            .add_odoo_database(OdooDatabase {
                database_id: DATABASE_ID.to_string(),
                organization_id: ORG_ID.to_string(),
                base_url: BASE_URL.to_string(),
                database_name: DATABASE_NAME.to_string(),
                admin_login: ADMIN_LOGIN.to_string(),
                encrypted_admin_password: vault.encrypt(ADMIN_PASSWORD).unwrap(),
            })
            .unwrap();

        let provisioner = Arc::new(UserProvisioner::new(
            odoo.clone(),
            repository.clone(),
            vault.clone(),
            GroupPolicy::default(),
            &OdooSettings::default(),
        ));

        Self {
            odoo,
            repository,
            vault,
            provisioner,
        }
    }

    pub fn add_user(&self, user_id: &str, email: &str, role: Option<&str>) {
        self.repository
            .inner
            .add_local_user(LocalUser::new(user_id, email, user_id, role))
            .unwrap();
    }

    pub fn record(&self) -> Option<ProvisioningRecord> {
        self.repository
            .records()
            .into_iter()
            .find(|r| r.local_user_id == USER_ID)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> String {
        self.vault.decrypt(sealed).unwrap().expose_secret().clone()
    }
}

//! Typed `res.users` operations.

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::client::RemoteSession;
use super::executor::RemoteCallExecutor;
use crate::models::AdminCredentials;
use crate::services::error::ProvisioningError;

const USERS_MODEL: &str = "res.users";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct NewRemoteUser<'a> {
    pub name: &'a str,
    pub login: &'a str,
    pub email: &'a str,
}

/// `create` answers with an id for one record, a list for a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreatedIds {
    One(i64),
    Many(Vec<i64>),
}

#[derive(Clone)]
pub struct OdooUsers {
    executor: Arc<RemoteCallExecutor>,
}

impl OdooUsers {
    pub fn new(executor: Arc<RemoteCallExecutor>) -> Self {
        Self { executor }
    }

    /// Looks up by login, archived accounts included.
    pub async fn find_by_login(
        &self,
        session: &mut RemoteSession,
        login: &str,
        admin: &AdminCredentials,
    ) -> Result<Option<RemoteUser>, ProvisioningError> {
        let users: Vec<RemoteUser> = self
            .executor
            .call(
                session,
                USERS_MODEL,
                "search_read",
                json!([[["login", "=", login]]]),
                json!({
                    "fields": ["id", "active"],
                    "limit": 1,
                    "context": {"active_test": false},
                }),
                Some(admin),
            )
            .await?;
        Ok(users.into_iter().next())
    }

    pub async fn create(
        &self,
        session: &mut RemoteSession,
        user: &NewRemoteUser<'_>,
        admin: &AdminCredentials,
    ) -> Result<i64, ProvisioningError> {
        let created: CreatedIds = self
            .executor
            .call(
                session,
                USERS_MODEL,
                "create",
                json!([{
                    "name": user.name,
                    "login": user.login,
                    "email": user.email,
                }]),
                json!({}),
                Some(admin),
            )
            .await?;

        match created {
            CreatedIds::One(id) => Ok(id),
            CreatedIds::Many(ids) => ids.into_iter().next().ok_or_else(|| {
                ProvisioningError::RemoteOperationFailed("create returned no id".to_string())
            }),
        }
    }

    /// Additive link of `group_ids` onto the account.
    pub async fn add_groups(
        &self,
        session: &mut RemoteSession,
        uid: i64,
        group_ids: &[i64],
        admin: &AdminCredentials,
    ) -> Result<(), ProvisioningError> {
        let links: Vec<Value> = group_ids.iter().map(|gid| json!([4, gid])).collect();
        self.write(session, uid, json!({ "groups_id": links }), admin)
            .await
    }

    pub async fn set_password(
        &self,
        session: &mut RemoteSession,
        uid: i64,
        password: &Secret<String>,
        admin: &AdminCredentials,
    ) -> Result<(), ProvisioningError> {
        self.write(
            session,
            uid,
            json!({ "password": password.expose_secret() }),
            admin,
        )
        .await
    }

    pub async fn set_active(
        &self,
        session: &mut RemoteSession,
        uid: i64,
        active: bool,
        admin: &AdminCredentials,
    ) -> Result<(), ProvisioningError> {
        self.write(session, uid, json!({ "active": active }), admin)
            .await
    }

    async fn write(
        &self,
        session: &mut RemoteSession,
        uid: i64,
        values: Value,
        admin: &AdminCredentials,
    ) -> Result<(), ProvisioningError> {
        let written: bool = self
            .executor
            .call(
                session,
                USERS_MODEL,
                "write",
                json!([[uid], values]),
                json!({}),
                Some(admin),
            )
            .await?;

        if written {
            Ok(())
        } else {
            Err(ProvisioningError::RemoteOperationFailed(format!(
                "res.users.write on {} returned false",
                uid
            )))
        }
    }
}

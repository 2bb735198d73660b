//! Role to Odoo permission group resolution.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::odoo::{RemoteCallExecutor, RemoteSession};
use crate::models::{AdminCredentials, ProvisioningWarning};

const FALLBACK_ROLE: &str = "user";

/// Which fully-qualified group names (`module.identifier`) each role gets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPolicy {
    pub version: String,
    /// Applied to every provisioned user.
    pub base: Vec<String>,
    /// Additive groups per role.
    pub roles: HashMap<String, Vec<String>>,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        let groups = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

        let roles = HashMap::from([
            (
                "admin".to_string(),
                groups(&[
                    "base.group_system",
                    "base.group_erp_manager",
                    "account.group_account_manager",
                    "sales_team.group_sale_manager",
                ]),
            ),
            (
                "accountant".to_string(),
                groups(&[
                    "account.group_account_user",
                    "account.group_account_invoice",
                    "analytic.group_analytic_accounting",
                ]),
            ),
            (
                "manager".to_string(),
                groups(&[
                    "sales_team.group_sale_manager",
                    "account.group_account_invoice",
                ]),
            ),
            (
                "salesperson".to_string(),
                groups(&["sales_team.group_sale_salesman"]),
            ),
            (FALLBACK_ROLE.to_string(), Vec::new()),
        ]);

        Self {
            version: "1".to_string(),
            base: groups(&["base.group_user", "base.group_partner_manager"]),
            roles,
        }
    }
}

impl GroupPolicy {
    /// Base groups followed by the role's groups, deduplicated in order.
    /// Unknown roles get the `user` policy.
    pub fn group_names_for(&self, role: &str) -> Vec<String> {
        let role = role.trim().to_lowercase();
        let extra = self
            .roles
            .get(&role)
            .or_else(|| self.roles.get(FALLBACK_ROLE))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut names: Vec<String> = Vec::with_capacity(self.base.len() + extra.len());
        for name in self.base.iter().chain(extra) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupResolution {
    pub group_ids: Vec<i64>,
    pub warnings: Vec<ProvisioningWarning>,
}

#[derive(Debug, Deserialize)]
struct ModelDataRow {
    res_id: i64,
}

#[derive(Clone)]
pub struct GroupResolver {
    executor: Arc<RemoteCallExecutor>,
    policy: Arc<GroupPolicy>,
}

impl GroupResolver {
    pub fn new(executor: Arc<RemoteCallExecutor>, policy: GroupPolicy) -> Self {
        Self {
            executor,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &GroupPolicy {
        &self.policy
    }

    /// Resolve each name to a remote id. Misses become warnings, never errors.
    pub async fn resolve_groups(
        &self,
        session: &mut RemoteSession,
        group_names: &[String],
        admin: &AdminCredentials,
    ) -> GroupResolution {
        let mut resolution = GroupResolution::default();

        for name in group_names {
            match self.resolve_one(session, name, admin).await {
                Ok(id) => {
                    if !resolution.group_ids.contains(&id) {
                        resolution.group_ids.push(id);
                    }
                }
                Err(warning) => {
                    warn!(group = %name, ?warning, "Skipping unresolved group");
                    resolution.warnings.push(warning);
                }
            }
        }

        debug!(
            resolved = resolution.group_ids.len(),
            skipped = resolution.warnings.len(),
            "Groups resolved"
        );
        resolution
    }

    async fn resolve_one(
        &self,
        session: &mut RemoteSession,
        name: &str,
        admin: &AdminCredentials,
    ) -> Result<i64, ProvisioningWarning> {
        let unresolved = |reason: String| ProvisioningWarning::GroupNotResolved {
            group: name.to_string(),
            reason,
        };

        let (module, identifier) = name
            .split_once('.')
            .filter(|(m, i)| !m.is_empty() && !i.is_empty())
            .ok_or_else(|| unresolved("expected module.identifier".to_string()))?;

        let rows: Vec<ModelDataRow> = self
            .executor
            .call(
                session,
                "ir.model.data",
                "search_read",
                json!([[
                    ["module", "=", module],
                    ["name", "=", identifier],
                    ["model", "=", "res.groups"],
                ]]),
                json!({"fields": ["res_id"], "limit": 1}),
                Some(admin),
            )
            .await
            .map_err(|e| unresolved(e.to_string()))?;

        rows.first()
            .map(|row| row.res_id)
            .ok_or_else(|| unresolved("no such group".to_string()))
    }
}

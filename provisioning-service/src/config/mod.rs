use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::services::groups::GroupPolicy;
use crate::services::vault::AesGcmVault;

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub vault: VaultConfig,
    pub odoo: OdooSettings,
    pub group_policy_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Base64 of a 32-byte AES-256 key.
    pub master_key: Secret<String>,
}

/// Transport settings for the Odoo JSON-RPC client.
#[derive(Debug, Clone, Deserialize)]
pub struct OdooSettings {
    pub request_timeout_secs: u64,
    pub api_key_path: String,
    pub api_key_name: String,
    pub api_key_scope: String,
}

impl OdooSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for OdooSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            api_key_path: "/provisioning/api_key".to_string(),
            api_key_name: "provisioning".to_string(),
            api_key_scope: "rpc".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let odoo_defaults = OdooSettings::default();

        let config = ProvisioningConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("provisioning-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
            },
            vault: VaultConfig {
                master_key: Secret::new(get_env("VAULT_MASTER_KEY", None, is_prod)?),
            },
            odoo: OdooSettings {
                request_timeout_secs: get_env_parsed(
                    "ODOO_REQUEST_TIMEOUT_SECS",
                    Some("30"),
                    is_prod,
                )?,
                api_key_path: env::var("ODOO_API_KEY_PATH").unwrap_or(odoo_defaults.api_key_path),
                api_key_name: env::var("ODOO_API_KEY_NAME").unwrap_or(odoo_defaults.api_key_name),
                api_key_scope: env::var("ODOO_API_KEY_SCOPE")
                    .unwrap_or(odoo_defaults.api_key_scope),
            },
            group_policy_path: env::var("GROUP_POLICY_PATH").ok().filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.odoo.request_timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ODOO_REQUEST_TIMEOUT_SECS must be positive"
            )));
        }

        AesGcmVault::from_base64(&self.vault.master_key).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("VAULT_MASTER_KEY is invalid: {}", e))
        })?;

        Ok(())
    }

    /// Role policy from `GROUP_POLICY_PATH`, or the built-in table.
    pub fn load_group_policy(&self) -> Result<GroupPolicy, AppError> {
        match &self.group_policy_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let policy: GroupPolicy = serde_json::from_str(&raw).map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Invalid group policy in {}: {}",
                        path,
                        e
                    ))
                })?;
                tracing::info!(path = %path, version = %policy.version, "Loaded group policy");
                Ok(policy)
            }
            None => Ok(GroupPolicy::default()),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_env_parsed<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, default, is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

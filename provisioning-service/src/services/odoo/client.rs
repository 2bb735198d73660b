//! Odoo JSON-RPC transport.
//!
//! `OdooApi` is the seam between the saga and the network: the HTTP client
//! below talks to a real Odoo, tests substitute an in-process fake.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use service_core::observability::traced_headers;
use tracing::{debug, warn};

use crate::config::OdooSettings;
use crate::services::error::ProvisioningError;

const SESSION_COOKIE: &str = "session_id";
const MAX_LOGGED_BODY: usize = 512;

/// Authenticated admin context for one top-level operation.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub base_url: String,
    pub session_id: Option<String>,
    pub cookies: Vec<String>,
    pub remote_user_id: i64,
}

impl RemoteSession {
    /// `Cookie` header value: the captured cookie set, else a bare session cookie.
    pub fn cookie_header(&self) -> Option<String> {
        if !self.cookies.is_empty() {
            Some(self.cookies.join("; "))
        } else {
            self.session_id
                .as_ref()
                .map(|id| format!("{}={}", SESSION_COOKIE, id))
        }
    }
}

/// Raw outcome of `/web/session/authenticate`, before validation.
#[derive(Debug, Clone, Default)]
pub struct AuthenticateResponse {
    pub uid: Option<i64>,
    pub session_id: Option<String>,
    pub cookies: Vec<String>,
}

impl AuthenticateResponse {
    /// Session id from the result body, else from the `session_id` cookie.
    pub fn effective_session_id(&self) -> Option<String> {
        self.session_id.clone().or_else(|| {
            self.cookies.iter().find_map(|cookie| {
                cookie
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(str::to_string)
            })
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRequest {
    pub user_id: i64,
    pub name: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyResult {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub token: Option<Secret<String>>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait OdooApi: Send + Sync {
    async fn authenticate(
        &self,
        base_url: &str,
        database: &str,
        login: &str,
        password: &Secret<String>,
    ) -> Result<AuthenticateResponse, ProvisioningError>;

    async fn call_kw(
        &self,
        session: &RemoteSession,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, ProvisioningError>;

    async fn generate_api_key(
        &self,
        session: &RemoteSession,
        request: &ApiKeyRequest,
    ) -> Result<ApiKeyResult, ProvisioningError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: Value,
    id: u32,
}

impl RpcRequest {
    fn call(params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "call",
            params,
            id: rand::random(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Odoo reports errors either as a structured object or a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RpcError {
    Text(String),
    Structured {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<RpcErrorData>,
    },
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RpcError {
    pub fn normalized_message(&self) -> String {
        match self {
            RpcError::Text(text) => text.clone(),
            RpcError::Structured {
                code,
                message,
                data,
            } => {
                let detail = data.as_ref().and_then(|d| d.message.clone());
                let name = data.as_ref().and_then(|d| d.name.clone());
                match (detail.or_else(|| message.clone()), name) {
                    (Some(text), Some(name)) => format!("{} ({})", text, name),
                    (Some(text), None) => text,
                    (None, Some(name)) => name,
                    (None, None) => match code {
                        Some(code) => format!("remote error code {}", code),
                        None => "unknown remote error".to_string(),
                    },
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthenticateResult {
    #[serde(default)]
    uid: Value,
    #[serde(default)]
    session_id: Option<String>,
}

/// Unwrap a JSON-RPC envelope. The body is parsed before the status is
/// checked so a remote error message survives a non-2xx response.
fn parse_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, String> {
    match serde_json::from_str::<RpcResponse<T>>(body) {
        Ok(RpcResponse {
            error: Some(error), ..
        }) => Err(error.normalized_message()),
        Ok(_) if !status.is_success() => Err(format!("HTTP {}", status)),
        Ok(RpcResponse {
            result: Some(result),
            ..
        }) => Ok(result),
        Ok(_) => Err("response has no result".to_string()),
        Err(_) if !status.is_success() => Err(format!("HTTP {}: {}", status, truncate(body))),
        Err(e) => Err(format!("malformed response: {}", e)),
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// `name=value` pairs of every `Set-Cookie` header.
fn response_cookies(headers: &header::HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .map(|pair| pair.trim().to_string())
        .filter(|pair| !pair.is_empty())
        .collect()
}

/// reqwest-backed `OdooApi`.
#[derive(Clone)]
pub struct OdooHttpClient {
    client: Client,
    api_key_path: String,
}

struct RawResponse {
    status: StatusCode,
    headers: header::HeaderMap,
    body: String,
}

impl OdooHttpClient {
    pub fn new(settings: &OdooSettings) -> Result<Self, ProvisioningError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| {
                ProvisioningError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key_path: settings.api_key_path.clone(),
        })
    }

    async fn post(
        &self,
        url: &str,
        params: Value,
        cookie: Option<String>,
    ) -> Result<RawResponse, reqwest::Error> {
        let mut request = self
            .client
            .post(url)
            .headers(traced_headers())
            .json(&RpcRequest::call(params));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(url = %url, status = %status, "Odoo response received");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl OdooApi for OdooHttpClient {
    async fn authenticate(
        &self,
        base_url: &str,
        database: &str,
        login: &str,
        password: &Secret<String>,
    ) -> Result<AuthenticateResponse, ProvisioningError> {
        let url = endpoint(base_url, "/web/session/authenticate");
        let params = json!({
            "db": database,
            "login": login,
            "password": password.expose_secret(),
        });

        let raw = self.post(&url, params, None).await.map_err(|e| {
            ProvisioningError::AuthenticationFailed(format!("request to {} failed: {}", url, e))
        })?;

        let result: AuthenticateResult = parse_envelope(raw.status, &raw.body).map_err(|msg| {
            warn!(database = %database, status = %raw.status, "Odoo authentication rejected");
            ProvisioningError::AuthenticationFailed(msg)
        })?;

        Ok(AuthenticateResponse {
            uid: result.uid.as_i64(),
            session_id: result.session_id.filter(|id| !id.is_empty()),
            cookies: response_cookies(&raw.headers),
        })
    }

    async fn call_kw(
        &self,
        session: &RemoteSession,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, ProvisioningError> {
        let url = endpoint(
            &session.base_url,
            &format!("/web/dataset/call_kw/{}/{}", model, method),
        );
        let params = json!({
            "model": model,
            "method": method,
            "args": args,
            "kwargs": kwargs,
        });

        let raw = self
            .post(&url, params, session.cookie_header())
            .await
            .map_err(|e| {
                ProvisioningError::RemoteOperationFailed(format!(
                    "{}.{} request failed: {}",
                    model, method, e
                ))
            })?;

        parse_envelope(raw.status, &raw.body).map_err(ProvisioningError::RemoteOperationFailed)
    }

    async fn generate_api_key(
        &self,
        session: &RemoteSession,
        request: &ApiKeyRequest,
    ) -> Result<ApiKeyResult, ProvisioningError> {
        let url = endpoint(&session.base_url, &self.api_key_path);
        let params = serde_json::to_value(request).map_err(|e| {
            ProvisioningError::RemoteOperationFailed(format!("invalid API key request: {}", e))
        })?;

        let raw = self
            .post(&url, params, session.cookie_header())
            .await
            .map_err(|e| {
                ProvisioningError::RemoteOperationFailed(format!(
                    "API key request failed: {}",
                    e
                ))
            })?;

        parse_envelope(raw.status, &raw.body).map_err(ProvisioningError::RemoteOperationFailed)
    }
}

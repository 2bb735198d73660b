pub mod client;
pub mod executor;
pub mod session;
pub mod signatures;
pub mod users;

pub use client::{
    ApiKeyRequest, ApiKeyResult, AuthenticateResponse, OdooApi, OdooHttpClient, RemoteSession,
};
pub use executor::{RemoteCallExecutor, SessionRetryPolicy};
pub use session::SessionAuthenticator;
pub use users::{NewRemoteUser, OdooUsers, RemoteUser};

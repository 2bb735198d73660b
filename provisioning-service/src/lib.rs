pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use services::UserProvisioner;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub provisioner: Arc<UserProvisioner>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/users/:user_id/provision",
            post(handlers::provisioning::provision_user),
        )
        .route(
            "/users/:user_id/deactivate",
            post(handlers::provisioning::deactivate_user),
        )
        .route(
            "/users/:user_id/credentials",
            get(handlers::provisioning::get_credentials),
        )
        .route(
            "/users/:user_id/web-login",
            get(handlers::provisioning::get_web_login),
        )
        .route(
            "/users/:user_id/exists",
            get(handlers::provisioning::user_exists),
        )
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

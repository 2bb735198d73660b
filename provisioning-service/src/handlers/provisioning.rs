//! HTTP surface of the provisioning saga.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        OrganizationQuery, ProvisionUserRequest, ProvisionUserResponse, UserCredentialsResponse,
        UserExistsResponse, WebLoginResponse,
    },
    AppState,
};

pub async fn provision_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<ProvisionUserRequest>,
) -> Result<(StatusCode, Json<ProvisionUserResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        local_user_id = %user_id,
        organization_id = %payload.organization_id,
        role = ?payload.role,
        "Provision requested"
    );

    let outcome = state
        .provisioner
        .provision_user(&user_id, &payload.organization_id, payload.role.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OrganizationQuery>,
) -> Result<StatusCode, AppError> {
    query.validate()?;

    state
        .provisioner
        .deactivate_user(&user_id, &query.organization_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_credentials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<UserCredentialsResponse>, AppError> {
    query.validate()?;

    let credentials = state
        .provisioner
        .get_user_credentials(&user_id, &query.organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User is not provisioned")))?;

    Ok(Json(credentials.into()))
}

pub async fn get_web_login(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<WebLoginResponse>, AppError> {
    query.validate()?;

    let url = state
        .provisioner
        .get_web_login_url(&user_id, &query.organization_id)
        .await?;

    Ok(Json(WebLoginResponse { url }))
}

pub async fn user_exists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<UserExistsResponse>, AppError> {
    query.validate()?;

    let exists = state
        .provisioner
        .user_exists(&user_id, &query.organization_id)
        .await?;

    Ok(Json(UserExistsResponse { exists }))
}

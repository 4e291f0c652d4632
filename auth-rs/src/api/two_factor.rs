//! API endpoints for 2FA

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::handlers::{credentials, AppState, AuthenticationResponse};
use crate::error::Result;
use crate::token::SessionUser;
use crate::two_factor::TwoFactorStatus;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "tmpToken", default)]
    pub tmp_token: String,
    #[serde(rename = "totpToken", default)]
    pub totp_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    #[serde(default)]
    pub password: String,
    #[serde(rename = "setupToken", default)]
    pub setup_token: String,
    #[serde(rename = "initialToken", default)]
    pub initial_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    #[serde(default)]
    pub password: String,
}

/// POST /rest/2fa/verify - Trade a temporary token and TOTP code for a session
pub async fn verify(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<AuthenticationResponse>> {
    let req = credentials(payload)?;
    let grant = state
        .service
        .verify(&req.tmp_token, &req.totp_token)
        .await?;

    Ok(Json(grant.into()))
}

/// GET /rest/2fa/status - 2FA status for current user
pub async fn status(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> Result<Json<TwoFactorStatus>> {
    Ok(Json(state.service.status(&user).await?))
}

/// POST /rest/2fa/setup - Enable 2FA
pub async fn setup(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    payload: std::result::Result<Json<SetupRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let req = credentials(payload)?;
    state
        .service
        .setup(&user, &req.password, &req.setup_token, &req.initial_token)
        .await?;

    Ok(StatusCode::OK)
}

/// POST /rest/2fa/disable - Disable 2FA (requires current password)
pub async fn disable(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    payload: std::result::Result<Json<DisableRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let req = credentials(payload)?;
    state.service.disable(&user, &req.password).await?;
    Ok(StatusCode::OK)
}

//! API request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuthError, Result};
use crate::two_factor::{LoginOutcome, SessionGrant, TwoFactorService};

/// Shared application state
pub struct AppState {
    pub service: TwoFactorService,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Session details handed to the client
#[derive(Debug, Serialize)]
pub struct Authentication {
    pub token: String,
    pub bid: i64,
    pub umail: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationResponse {
    pub authentication: Authentication,
}

impl From<SessionGrant> for AuthenticationResponse {
    fn from(grant: SessionGrant) -> Self {
        Self {
            authentication: Authentication {
                token: grant.token,
                bid: grant.basket_id,
                umail: grant.email,
            },
        }
    }
}

/// Password accepted, second factor still required
#[derive(Debug, Serialize)]
pub struct TotpRequiredResponse {
    pub status: &'static str,
    pub data: TmpTokenData,
}

#[derive(Debug, Serialize)]
pub struct TmpTokenData {
    #[serde(rename = "tmpToken")]
    pub tmp_token: String,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "passwordRepeat", default)]
    pub password_repeat: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: &'static str,
    pub data: RegisteredUser,
}

/// Unwrap a credential-bearing body. Any unreadable payload counts as a
/// failed authentication.
pub(crate) fn credentials<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(req)| req).map_err(|rejection| {
        debug!("Rejected request body: {}", rejection.body_text());
        AuthError::Unauthorized
    })
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /rest/user/login - Authenticate with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let req = credentials(payload)?;
    let response = match state.service.login(&req.email, &req.password).await? {
        LoginOutcome::Session(grant) => Json(AuthenticationResponse::from(grant)).into_response(),
        LoginOutcome::SecondFactorRequired { tmp_token } => Json(TotpRequiredResponse {
            status: "totp_token_required",
            data: TmpTokenData { tmp_token },
        })
        .into_response(),
    };

    Ok(response)
}

/// POST /api/Users - Register a new account
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let Json(req) = payload.map_err(|rejection| AuthError::BadRequest(rejection.body_text()))?;
    let email = req.email.trim();

    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::BadRequest("A valid email is required".to_string()));
    }
    if req.password.is_empty() {
        return Err(AuthError::BadRequest("Password must not be empty".to_string()));
    }
    if req.password != req.password_repeat {
        return Err(AuthError::BadRequest("Passwords do not match".to_string()));
    }

    let user = state.service.users().create(email, &req.password).await?;
    info!("Registered user {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: "success",
            data: RegisteredUser {
                id: user.id,
                email: user.email,
            },
        }),
    ))
}

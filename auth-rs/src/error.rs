use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::token::TokenError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

impl AuthError {
    /// HTTP status for this error.
    ///
    /// Every credential, token and one-time code failure maps to the same
    /// 401 so a caller cannot tell which factor was wrong.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::Unauthorized
            | AuthError::NotAuthenticated
            | AuthError::Token(_) => StatusCode::UNAUTHORIZED,
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Database(_)
            | AuthError::Config(_)
            | AuthError::Io(_)
            | AuthError::Json(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AuthError::BadRequest(msg) | AuthError::Conflict(msg) => ApiError::new(msg),
            _ if status == StatusCode::UNAUTHORIZED => ApiError::new("Unauthorized"),
            _ => {
                error!("Request failed: {}", self);
                ApiError::new("Internal server error")
            }
        };

        (status, Json(body)).into_response()
    }
}

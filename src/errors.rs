use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILED: &str = "FAILED";

/// Failure outcomes of the auth operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    DuplicateUser,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    StoreFailure(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub msg: String,
    pub status: &'static str,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DuplicateUser
            | AuthError::InvalidCredentials
            | AuthError::TokenInvalid
            | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::TokenExpired | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::DuplicateUser => "User already exists".into(),
            AuthError::UserNotFound => "User not found".into(),
            AuthError::InvalidCredentials => "Invalid Password".into(),
            AuthError::TokenInvalid => "Invalid token".into(),
            AuthError::TokenExpired => "Token expired".into(),
            AuthError::Unauthorized(msg) | AuthError::Validation(msg) => msg.clone(),
            AuthError::StoreFailure(_) => "Internal server error".into(),
        }
    }
}

/// Undecodable bodies (bad JSON, wrong field types, wrong content type)
/// answer with the same envelope as any other validation failure.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::StoreFailure(e) = &self {
            error!(error = %e, "request failed");
        }
        let body = ErrorBody {
            msg: self.public_message(),
            status: STATUS_FAILED,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

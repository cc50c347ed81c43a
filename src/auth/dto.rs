use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{auth::repo_types::User, errors::AuthError};

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn require(value: &str, field: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        require(&self.username, "username")?;
        require(&self.email, "email")?;
        require(&self.password, "password")?;
        if !is_valid_email(&self.email) {
            return Err(AuthError::Validation("Invalid email".into()));
        }
        Ok(())
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        require(&self.email, "email")?;
        require(&self.password, "password")
    }
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

impl ForgotPasswordRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        require(&self.email, "email")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

impl ResetPasswordRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        require(&self.token, "token")?;
        require(&self.new_password, "newPassword")
    }
}

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status: &'static str,
}

impl<T> ApiResponse<T> {
    pub fn data(msg: &str, data: T) -> Self {
        Self {
            msg: msg.into(),
            token: None,
            data: Some(data),
            status: crate::errors::STATUS_SUCCESS,
        }
    }
}

impl ApiResponse<()> {
    pub fn ack(msg: &str) -> Self {
        Self {
            msg: msg.into(),
            token: None,
            data: None,
            status: crate::errors::STATUS_SUCCESS,
        }
    }
}

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

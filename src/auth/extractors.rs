use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use tracing::warn;

use super::{claims::Claims, jwt::TokenService};
use crate::errors::AuthError;

/// Header slot carrying the raw token (no `Bearer ` scheme).
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Verified identity of the caller, taken from the `x-auth-token` header.
pub struct AuthUser(pub Claims);

/// Expired and malformed tokens are rejected alike here.
pub fn authorize(headers: &HeaderMap, tokens: &TokenService) -> Result<Claims, AuthError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Unauthorized("Unauthorized user".into()))?;

    tokens.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AuthError::Unauthorized("Invalid or expired token".into())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        authorize(&parts.headers, &tokens).map(AuthUser)
    }
}

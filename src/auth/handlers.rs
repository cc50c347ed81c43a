use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            ApiResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest,
            ResetPasswordRequest,
        },
        extractors::AuthUser,
        repo_types::User,
    },
    errors::{AuthError, STATUS_SUCCESS},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(get_me))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), AuthError> {
    let Json(payload) = body?;
    payload.validate()?;
    let user = state
        .auth
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data("User Registration Success!", user)),
    ))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AuthError> {
    let Json(payload) = body?;
    payload.validate()?;
    let out = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(ApiResponse {
        msg: "Login success".into(),
        token: Some(out.token),
        data: Some(out.user),
        status: STATUS_SUCCESS,
    }))
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<User>>, AuthError> {
    let user = state.auth.get_identity(&claims).await?;
    Ok(Json(ApiResponse::data("SUCCESS", user)))
}

#[instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    let Json(payload) = body?;
    payload.validate()?;
    state.auth.initiate_reset(&payload.email).await?;
    Ok(Json(ApiResponse::ack("Password reset link sent to email")))
}

#[instrument(skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    let Json(payload) = body?;
    payload.validate()?;
    state
        .auth
        .complete_reset(&payload.token, &payload.new_password)
        .await?;
    Ok(Json(ApiResponse::ack("Password reset successful")))
}

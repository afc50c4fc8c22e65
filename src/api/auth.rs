//! Authentication API endpoints.
//!
//! - POST `/signup` - Create an inactive account and send a verification token
//! - POST `/verify-email` - Activate the account and open the first session
//! - POST `/signin` - Sign in by email or username
//! - POST `/refresh` - Rotate a refresh token
//! - POST `/verify-tokens` - Check an access token, renewing it if expired
//! - POST `/signout` - End a client session

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{
    AuthCoordinator, RefreshRequest, SigninRequest, SignoutRequest, SignupRequest,
    VerifyEmailRequest, VerifyTokensRequest,
};

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthCoordinator>,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/verify-email", post(verify_email))
        .route("/signin", post(signin))
        .route("/refresh", post(refresh))
        .route("/verify-tokens", post(verify_tokens))
        .route("/signout", post(signout))
        .with_state(state)
}

async fn signup(
    State(state): State<AuthState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state.auth.signup(&req).await?;
    Ok(StatusCode::CREATED)
}

async fn verify_email(
    State(state): State<AuthState>,
    body: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let tokens = state.auth.verify_email(&req.token).await?;
    Ok(Json(tokens))
}

async fn signin(
    State(state): State<AuthState>,
    body: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let tokens = state.auth.signin(&req).await?;
    Ok(Json(tokens))
}

async fn refresh(
    State(state): State<AuthState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let refreshed = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(refreshed))
}

async fn verify_tokens(
    State(state): State<AuthState>,
    body: Result<Json<VerifyTokensRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let verified = state
        .auth
        .verify_tokens(&req.access_token, req.refresh_token.as_deref())
        .await?;
    Ok(Json(verified))
}

async fn signout(
    State(state): State<AuthState>,
    body: Result<Json<SignoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state.auth.signout(&req.client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

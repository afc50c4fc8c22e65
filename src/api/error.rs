//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

use crate::auth::AuthError;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    /// A failure from the auth flows.
    Auth(AuthError),
    /// The request body could not be read as the expected JSON.
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(e) => match e {
                AuthError::Validation { .. } => StatusCode::BAD_REQUEST,
                AuthError::DuplicateCredential { .. } | AuthError::AlreadyActivated => {
                    StatusCode::CONFLICT
                }
                AuthError::NotActivated => StatusCode::FORBIDDEN,
                AuthError::InvalidCredential
                | AuthError::TokenExpired { .. }
                | AuthError::TokenInvalid { .. }
                | AuthError::SessionInvalid => StatusCode::UNAUTHORIZED,
                AuthError::Server => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection, "Rejected request body");
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(message) => ErrorResponse {
                error: "bad_request",
                message,
            },
            ApiError::Auth(e) => ErrorResponse {
                error: e.code(),
                message: e.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

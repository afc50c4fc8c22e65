mod auth;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthCoordinator;

pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(auth: Arc<AuthCoordinator>) -> Router {
    let auth_state = auth::AuthState { auth };

    Router::new().nest("/auth", auth::router(auth_state))
}

//! Request and response records for the auth flows.

use serde::{Deserialize, Serialize};

use crate::store::UserInfo;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Sign in by email or username. An identifier containing `@` is an email.
#[derive(Debug, Clone, Deserialize)]
pub struct SigninRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokensRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignoutRequest {
    pub client_id: String,
}

/// Tokens for one client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub user: UserInfo,
}

/// Result of verifying an access token.
///
/// `renewed` is set when the access token had expired and the supplied refresh
/// token was rotated to replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyTokensResponse {
    pub user: UserInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub renewed: Option<SessionTokens>,
}

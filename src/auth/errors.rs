//! User-facing error taxonomy for the auth flows.

use std::fmt::Display;
use thiserror::Error;
use tracing::error;

use crate::jwt::{TokenError, TokenKind};

/// Every failure an auth flow can report to its caller.
///
/// Anything that does not fit one of the specific variants is logged where it
/// happens and collapsed into `Server`, so store or driver details never leave
/// the coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{}", duplicate_message(.username, .email))]
    DuplicateCredential { username: bool, email: bool },
    #[error("account is not activated")]
    NotActivated,
    #[error("account is already activated")]
    AlreadyActivated,
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("{kind} token has expired")]
    TokenExpired { kind: TokenKind },
    #[error("{kind} token is invalid")]
    TokenInvalid { kind: TokenKind },
    #[error("session is no longer valid, sign in again")]
    SessionInvalid,
    #[error("internal server error")]
    Server,
}

fn duplicate_message(username: &bool, email: &bool) -> &'static str {
    match (*username, *email) {
        (true, true) => "username and email are already taken",
        (true, false) => "username is already taken",
        (false, true) => "email is already taken",
        (false, false) => "credentials are already taken",
    }
}

impl AuthError {
    pub(crate) fn validation(field: &'static str, reason: &'static str) -> Self {
        Self::Validation { field, reason }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation { .. } => "validation_error",
            AuthError::DuplicateCredential { .. } => "duplicate_credential",
            AuthError::NotActivated => "not_activated",
            AuthError::AlreadyActivated => "already_activated",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::TokenExpired { .. } => "token_expired",
            AuthError::TokenInvalid { .. } => "token_invalid",
            AuthError::SessionInvalid => "session_invalid",
            AuthError::Server => "server_error",
        }
    }

    /// Classify a verification failure for a token of `kind`.
    pub(crate) fn from_token(kind: TokenKind, e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired { kind },
            TokenError::Invalid | TokenError::Malformed => AuthError::TokenInvalid { kind },
            e @ (TokenError::Encoding(_) | TokenError::ExpiryOverflow) => {
                error!(%kind, error = %e, "Token encoding failed during verification");
                AuthError::Server
            }
        }
    }
}

/// Extension trait that logs unclassified failures and collapses them to
/// [`AuthError::Server`].
pub(crate) trait ResultExt<T> {
    fn server_err(self, op: &'static str) -> Result<T, AuthError>;
}

impl<T, E: Display> ResultExt<T> for Result<T, E> {
    fn server_err(self, op: &'static str) -> Result<T, AuthError> {
        self.map_err(|e| server(op, e))
    }
}

/// Log an unclassified failure of `op` and collapse it.
pub(crate) fn server(op: &'static str, e: impl Display) -> AuthError {
    error!(op, error = %e, "Auth operation failed");
    AuthError::Server
}

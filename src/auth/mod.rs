//! Credential and session lifecycle.
//!
//! [`AuthCoordinator`] drives the six request flows (signup, email
//! verification, signin, refresh, combined token verification, signout) over
//! the token issuer, the password verifier, and the store collaborators.
//!
//! Session state per client: unauthenticated, then an active session holding
//! one refresh token id, replaced on every refresh, until a stale refresh or a
//! signout invalidates it. Only a new signin or verification starts another.

mod errors;
mod registration;
mod session;
mod types;
mod validate;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::jwt::{TokenIssuer, expiry_after};
use crate::password::CredentialVerifier;
use crate::random::RandomSource;
use crate::store::{Isolation, NewSession, Notifier, SessionStore, UserInfo, UserRepository};

pub use errors::AuthError;
pub use types::{
    RefreshRequest, RefreshResponse, SessionTokens, SigninRequest, SignoutRequest, SignupRequest,
    VerifyEmailRequest, VerifyTokensRequest, VerifyTokensResponse,
};

use errors::ResultExt;

/// Refresh token (and session row) lifetime default: 30 days
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Session policy supplied by the operator.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Lifetime of a refresh token, applied at creation and on every rotation.
    pub refresh_ttl_secs: u64,
    /// Keep at most this many sessions per user. `None` means unlimited.
    pub max_sessions_per_user: Option<u32>,
    /// Isolation for the signup check-then-insert transaction.
    pub signup_isolation: Isolation,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            max_sessions_per_user: None,
            signup_isolation: Isolation::Immediate,
        }
    }
}

/// External collaborators the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct AuthCoordinator {
    tokens: TokenIssuer,
    credentials: CredentialVerifier,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    settings: SessionSettings,
}

impl AuthCoordinator {
    pub fn new(
        tokens: TokenIssuer,
        credentials: CredentialVerifier,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            tokens,
            credentials,
            users: collaborators.users,
            sessions: collaborators.sessions,
            notifier: collaborators.notifier,
            clock,
            random,
            settings,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Hash a new password under a fresh salt. Returns `(hash, salt)`, both base64.
    ///
    /// The KDF is CPU-bound, so it runs on the blocking pool.
    async fn hash_password(&self, password: &str) -> Result<(String, String), AuthError> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = credentials.salt(None);
            credentials
                .hash_with_salt(&password, &salt)
                .map(|hash| (hash, CredentialVerifier::encode_salt(&salt)))
        })
        .await
        .server_err("hash password")?
        .server_err("hash password")
    }

    async fn check_password(
        &self,
        stored_hash: &str,
        password: &str,
        stored_salt: &str,
    ) -> Result<bool, AuthError> {
        let credentials = self.credentials.clone();
        let stored_hash = stored_hash.to_string();
        let password = password.to_string();
        let stored_salt = stored_salt.to_string();
        tokio::task::spawn_blocking(move || {
            credentials.compare_passwords(&stored_hash, &password, &stored_salt)
        })
        .await
        .server_err("compare password")?
        .server_err("compare password")
    }

    /// Expiry for a session created or rotated now.
    fn session_expiry(&self) -> Result<u64, AuthError> {
        expiry_after(self.clock.now(), self.settings.refresh_ttl_secs)
            .server_err("session expiry")
    }

    /// Start a session for `user` under a fresh client id.
    async fn open_session(&self, user: &UserInfo) -> Result<SessionTokens, AuthError> {
        let client_id = self.random.new_id();
        let token_id = self.random.new_id();
        let expires_at = self.session_expiry()?;

        let access_token = self
            .tokens
            .issue_access(user)
            .server_err("issue access token")?;
        let refresh_token = self
            .tokens
            .issue_refresh(&client_id, &token_id, expires_at)
            .server_err("issue refresh token")?;

        self.sessions
            .create_or_replace(&NewSession {
                user_id: user.id,
                client_id: client_id.clone(),
                token_id,
                expires_at,
            })
            .await
            .server_err("create session")?;

        if let Some(keep) = self.settings.max_sessions_per_user {
            match self.sessions.trim_user_sessions(user.id, keep).await {
                Ok(count) if count > 0 => {
                    debug!(user_id = user.id, count, "Trimmed oldest sessions")
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = user.id, error = %e, "Failed to trim sessions"),
            }
        }

        Ok(SessionTokens {
            access_token,
            refresh_token,
            client_id,
        })
    }
}

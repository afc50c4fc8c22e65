//! Collaborator interfaces consumed by the auth coordinator.
//!
//! The coordinator only sees these traits. `crate::db` provides the sqlite
//! implementations; tests may substitute their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

/// Full user record, including credentials. Never leaves the core.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub role: UserRole,
    /// Base64 argon2id output
    pub password_hash: String,
    /// Base64 salt
    pub password_salt: String,
}

impl User {
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Public identity embedded in access tokens and returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

/// A user row to insert at signup. Always inactive.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub password_hash: String,
    pub password_salt: String,
}

/// Which of the signup credentials are already in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Availability {
    pub username_taken: bool,
    pub email_taken: bool,
}

impl Availability {
    pub fn is_free(&self) -> bool {
        !self.username_taken && !self.email_taken
    }
}

/// Session row to create or replace, keyed by `client_id`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub client_id: String,
    pub token_id: String,
    pub expires_at: u64,
}

/// Conditional rotation of a session's refresh token id.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub client_id: String,
    pub old_token_id: String,
    pub new_token_id: String,
    pub new_expires_at: u64,
}

/// Transaction isolation requested for a write transaction.
///
/// Maps onto sqlite's `BEGIN DEFERRED | IMMEDIATE | EXCLUSIVE`.
/// `Immediate` takes the write lock when the transaction starts, which
/// serializes check-then-insert sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Isolation {
    Deferred,
    #[default]
    Immediate,
    Exclusive,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("user is already active")]
    AlreadyActive,
    #[error("session does not hold the presented token id")]
    SessionInvalid,
    #[error("unique constraint violated (username: {username}, email: {email})")]
    Conflict { username: bool, email: bool },
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(Box::new(e))
    }
}

/// User lookup, creation, and activation.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Open a write transaction for the signup sequence.
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn UserTransaction>, StoreError>;

    /// Activate the user with `email` if currently inactive.
    ///
    /// Fails with `AlreadyActive` if the user exists and is active, `NotFound`
    /// if no user has that email.
    async fn activate_if_inactive(&self, email: &str) -> Result<UserInfo, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;
}

/// Transaction-scoped user operations. Dropping without `commit` rolls back.
#[async_trait]
pub trait UserTransaction: Send {
    async fn check_free(&mut self, username: &str, email: &str)
    -> Result<Availability, StoreError>;

    /// Insert an inactive user. Returns the new user id.
    async fn insert(&mut self, user: &NewUser) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persisted sessions, one row per client identifier.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unconditional upsert keyed by client id.
    async fn create_or_replace(&self, session: &NewSession) -> Result<(), StoreError>;

    /// Atomically swap `old_token_id` for `new_token_id`.
    ///
    /// Succeeds only if the row for the client currently holds the old id and
    /// returns the owner. Any mismatch fails with `SessionInvalid` and leaves
    /// the row untouched.
    async fn rotate(&self, rotation: &Rotation) -> Result<UserInfo, StoreError>;

    /// Remove the session. Succeeds whether or not a row existed.
    async fn delete(&self, client_id: &str) -> Result<(), StoreError>;

    /// Keep only the newest `keep` sessions of a user. Returns rows removed.
    async fn trim_user_sessions(&self, user_id: i64, keep: u32) -> Result<u64, StoreError>;

    /// Remove sessions whose expiry is at or before `now`. Returns rows removed.
    async fn delete_expired(&self, now: u64) -> Result<u64, StoreError>;
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound delivery of email verification tokens.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, token: &str) -> Result<(), NotifyError>;
}

//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use authkeep::auth::{SessionSettings, SessionTokens, SignupRequest};
use authkeep::clock::ManualClock;
use authkeep::db::Database;
use authkeep::jwt::TokenConfig;
use authkeep::password::{DEFAULT_SALT_LENGTH, HashConfig};
use authkeep::random::OsRandom;
use authkeep::store::{Notifier, NotifyError};
use authkeep::{AppContext, ServerConfig, Services};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const START: u64 = 1_700_000_000;
pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789";

/// Notifier that records every token it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, token: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), token.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub ctx: AppContext,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Cheap KDF parameters so tests do not spend their time in argon2.
pub fn fast_hashing() -> HashConfig {
    HashConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
        salt_length: DEFAULT_SALT_LENGTH,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(":memory:", SessionSettings::default()).await
}

pub async fn test_app_with(path: &str, sessions: SessionSettings) -> TestApp {
    let db = Database::open(path)
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::new(START));
    let notifier = Arc::new(RecordingNotifier::default());

    let config = ServerConfig {
        db,
        jwt_secret: JWT_SECRET.to_vec(),
        tokens: TokenConfig::default(),
        hashing: fast_hashing(),
        sessions,
        cleanup_interval: Duration::from_secs(3600),
    };
    let services = Services {
        clock: clock.clone(),
        random: Arc::new(OsRandom),
        notifier: notifier.clone(),
    };
    let ctx = AppContext::new(config, services).expect("Failed to build context");

    TestApp {
        ctx,
        clock,
        notifier,
    }
}

pub fn signup_request(username: &str, email: &str, password: &str) -> SignupRequest {
    SignupRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

/// Sign up and verify a user, returning the session opened by verification.
pub async fn register(app: &TestApp, username: &str, email: &str, password: &str) -> SessionTokens {
    app.ctx
        .auth
        .signup(&signup_request(username, email, password))
        .await
        .expect("signup failed");
    let token = app
        .notifier
        .token_for(email)
        .expect("no verification token sent");
    app.ctx
        .auth
        .verify_email(&token)
        .await
        .expect("verification failed")
}

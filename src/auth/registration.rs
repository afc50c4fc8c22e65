//! Signup and email verification.

use tracing::{debug, info};

use super::errors::{AuthError, ResultExt, server};
use super::types::{SessionTokens, SignupRequest};
use super::{AuthCoordinator, validate};
use crate::jwt::TokenKind;
use crate::store::{NewUser, StoreError, UserRole};

impl AuthCoordinator {
    /// Create an inactive user and send it an email verification token.
    ///
    /// The password hash and verification token are prepared before the
    /// store transaction opens, so the write lock is not held across the KDF.
    /// The uniqueness check, the insert, and the notification share that
    /// transaction: a concurrent signup for the same name either waits on it
    /// or fails its own insert, and a failed delivery leaves no user behind.
    pub async fn signup(&self, req: &SignupRequest) -> Result<(), AuthError> {
        validate::username(&req.username)?;
        validate::email(&req.email)?;
        validate::password(&req.password)?;

        let (password_hash, password_salt) = self.hash_password(&req.password).await?;
        let token = self
            .tokens
            .issue_email_verification(&req.email)
            .server_err("signup: issue verification token")?;

        let mut tx = self
            .users
            .begin(self.settings.signup_isolation)
            .await
            .server_err("signup: begin transaction")?;

        let availability = tx
            .check_free(&req.username, &req.email)
            .await
            .server_err("signup: check availability")?;
        if !availability.is_free() {
            debug!(username = %req.username, "Signup rejected, credentials taken");
            return Err(AuthError::DuplicateCredential {
                username: availability.username_taken,
                email: availability.email_taken,
            });
        }

        let user_id = tx
            .insert(&NewUser {
                username: req.username.clone(),
                email: req.email.clone(),
                role: UserRole::User,
                password_hash,
                password_salt,
            })
            .await
            .map_err(|e| duplicate_or_server(e, "signup: insert user"))?;

        self.notifier
            .send(&req.email, &token)
            .await
            .server_err("signup: send verification")?;

        tx.commit()
            .await
            .map_err(|e| duplicate_or_server(e, "signup: commit"))?;

        info!(user_id, username = %req.username, "User signed up");
        Ok(())
    }

    /// Activate the account named by an email verification token and open its
    /// first session.
    pub async fn verify_email(&self, token: &str) -> Result<SessionTokens, AuthError> {
        validate::token("token", token)?;

        let email = self
            .tokens
            .verify_email_verification(token)
            .map_err(|e| AuthError::from_token(TokenKind::EmailVerification, e))?;

        let user = match self.users.activate_if_inactive(&email).await {
            Ok(user) => user,
            Err(StoreError::AlreadyActive) => return Err(AuthError::AlreadyActivated),
            // Signed by us, but the account is gone
            Err(StoreError::NotFound) => {
                return Err(AuthError::TokenInvalid {
                    kind: TokenKind::EmailVerification,
                });
            }
            Err(e) => return Err(e).server_err("verify email: activate"),
        };

        let tokens = self.open_session(&user).await?;
        info!(user_id = user.id, client_id = %tokens.client_id, "User activated");
        Ok(tokens)
    }
}

fn duplicate_or_server(e: StoreError, op: &'static str) -> AuthError {
    match e {
        StoreError::Conflict { username, email } => {
            AuthError::DuplicateCredential { username, email }
        }
        other => server(op, other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::super::SessionSettings;
    use super::super::test_support::*;
    use super::*;
    use crate::store::UserRepository;

    #[tokio::test]
    async fn test_signup_creates_inactive_user_and_notifies() {
        let h = harness(SessionSettings::default()).await;

        h.auth
            .signup(&signup_request("alice", "a@x.com", "pw1"))
            .await
            .unwrap();

        let user = h.db.users().find_by_username("alice").await.unwrap();
        assert!(!user.active);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, UserRole::User);
        assert_ne!(user.password_hash, "pw1");

        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@x.com");
        assert_eq!(
            h.auth.tokens().verify_email_verification(&sent[0].1).unwrap(),
            "a@x.com"
        );
    }

    #[tokio::test]
    async fn test_signup_duplicate_names_taken_fields() {
        let h = harness(SessionSettings::default()).await;
        h.auth
            .signup(&signup_request("alice", "a@x.com", "pw1"))
            .await
            .unwrap();

        assert_eq!(
            h.auth
                .signup(&signup_request("alice", "b@x.com", "pw1"))
                .await,
            Err(AuthError::DuplicateCredential {
                username: true,
                email: false
            })
        );
        assert_eq!(
            h.auth
                .signup(&signup_request("ALICE", "A@X.COM", "pw1"))
                .await,
            Err(AuthError::DuplicateCredential {
                username: true,
                email: true
            })
        );
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_signup_rolls_back_when_delivery_fails() {
        let h = harness(SessionSettings::default()).await;
        h.notifier.fail.store(true, Ordering::SeqCst);

        assert_eq!(
            h.auth
                .signup(&signup_request("alice", "a@x.com", "pw1"))
                .await,
            Err(AuthError::Server)
        );
        assert!(matches!(
            h.db.users().find_by_username("alice").await,
            Err(StoreError::NotFound)
        ));

        h.notifier.fail.store(false, Ordering::SeqCst);
        h.auth
            .signup(&signup_request("alice", "a@x.com", "pw1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let h = harness(SessionSettings::default()).await;

        assert!(matches!(
            h.auth.signup(&signup_request("", "a@x.com", "pw1")).await,
            Err(AuthError::Validation {
                field: "username",
                ..
            })
        ));
        assert!(matches!(
            h.auth.signup(&signup_request("alice", "nope", "pw1")).await,
            Err(AuthError::Validation { field: "email", .. })
        ));
        assert!(matches!(
            h.auth.signup(&signup_request("alice", "a@x.com", "")).await,
            Err(AuthError::Validation {
                field: "password",
                ..
            })
        ));
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_email_activates_once() {
        let h = harness(SessionSettings::default()).await;
        h.auth
            .signup(&signup_request("alice", "a@x.com", "pw1"))
            .await
            .unwrap();
        let token = h.notifier.last_token().unwrap();

        let tokens = h.auth.verify_email(&token).await.unwrap();
        assert!(!tokens.client_id.is_empty());
        let user = h.auth.tokens().verify_access(&tokens.access_token).unwrap();
        assert_eq!(user.username, "alice");
        assert!(h.db.users().find_by_username("alice").await.unwrap().active);

        assert_eq!(
            h.auth.verify_email(&token).await,
            Err(AuthError::AlreadyActivated)
        );
    }

    #[tokio::test]
    async fn test_verify_email_token_errors() {
        let h = harness(SessionSettings::default()).await;
        h.auth
            .signup(&signup_request("alice", "a@x.com", "pw1"))
            .await
            .unwrap();
        let token = h.notifier.last_token().unwrap();

        assert_eq!(
            h.auth.verify_email("garbage").await,
            Err(AuthError::TokenInvalid {
                kind: TokenKind::EmailVerification
            })
        );

        // Access tokens are not accepted as verification tokens
        let stray = h.auth.tokens().issue_access(&crate::store::UserInfo {
            id: 1,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            role: UserRole::User,
        });
        assert_eq!(
            h.auth.verify_email(&stray.unwrap()).await,
            Err(AuthError::TokenInvalid {
                kind: TokenKind::EmailVerification
            })
        );

        h.clock
            .advance(h.auth.tokens().config().email_verify_ttl_secs);
        assert_eq!(
            h.auth.verify_email(&token).await,
            Err(AuthError::TokenExpired {
                kind: TokenKind::EmailVerification
            })
        );
    }

    #[tokio::test]
    async fn test_verify_email_for_unknown_address() {
        let h = harness(SessionSettings::default()).await;
        let token = h
            .auth
            .tokens()
            .issue_email_verification("ghost@x.com")
            .unwrap();

        assert_eq!(
            h.auth.verify_email(&token).await,
            Err(AuthError::TokenInvalid {
                kind: TokenKind::EmailVerification
            })
        );
    }

    mod ordering {
        use async_trait::async_trait;
        use std::sync::{Arc, Mutex};

        use crate::auth::test_support::{RecordingNotifier, START, signup_request};
        use crate::auth::{AuthCoordinator, Collaborators, SessionSettings};
        use crate::clock::ManualClock;
        use crate::db::{Database, SqliteUserRepository};
        use crate::jwt::{TokenConfig, TokenIssuer};
        use crate::password::{CredentialVerifier, DEFAULT_SALT_LENGTH, HashConfig};
        use crate::random::{OsRandom, RandomSource};
        use crate::store::{
            Isolation, StoreError, User, UserInfo, UserRepository, UserTransaction,
        };

        type Events = Arc<Mutex<Vec<&'static str>>>;

        struct RecordingRandom(Events);

        impl RandomSource for RecordingRandom {
            fn fill_bytes(&self, dest: &mut [u8]) {
                self.0.lock().unwrap().push("salt");
                OsRandom.fill_bytes(dest);
            }

            fn new_id(&self) -> String {
                OsRandom.new_id()
            }
        }

        struct RecordingUsers {
            inner: SqliteUserRepository,
            events: Events,
        }

        #[async_trait]
        impl UserRepository for RecordingUsers {
            async fn begin(
                &self,
                isolation: Isolation,
            ) -> Result<Box<dyn UserTransaction>, StoreError> {
                self.events.lock().unwrap().push("begin");
                self.inner.begin(isolation).await
            }

            async fn activate_if_inactive(&self, email: &str) -> Result<UserInfo, StoreError> {
                self.inner.activate_if_inactive(email).await
            }

            async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
                self.inner.find_by_email(email).await
            }

            async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
                self.inner.find_by_username(username).await
            }
        }

        #[tokio::test]
        async fn test_password_hashed_before_transaction_opens() {
            let db = Database::open(":memory:").await.unwrap();
            let events: Events = Arc::default();
            let clock = Arc::new(ManualClock::new(START));
            let random: Arc<dyn RandomSource> = Arc::new(RecordingRandom(events.clone()));

            let auth = AuthCoordinator::new(
                TokenIssuer::new(
                    b"unit-test-secret-that-is-long-enough",
                    TokenConfig::default(),
                    clock.clone(),
                ),
                CredentialVerifier::new(
                    HashConfig {
                        memory_kib: 64,
                        iterations: 1,
                        parallelism: 1,
                        salt_length: DEFAULT_SALT_LENGTH,
                    },
                    random.clone(),
                )
                .unwrap(),
                Collaborators {
                    users: Arc::new(RecordingUsers {
                        inner: db.users(),
                        events: events.clone(),
                    }),
                    sessions: Arc::new(db.sessions()),
                    notifier: Arc::new(RecordingNotifier::default()),
                },
                clock,
                random,
                SessionSettings::default(),
            );

            auth.signup(&signup_request("alice", "a@x.com", "pw1"))
                .await
                .unwrap();

            assert_eq!(*events.lock().unwrap(), vec!["salt", "begin"]);
            assert!(db.users().find_by_username("alice").await.is_ok());
        }
    }
}

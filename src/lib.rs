pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod notify;
pub mod password;
pub mod random;
pub mod store;

use api::create_api_router;
use auth::{AuthCoordinator, Collaborators, SessionSettings};
use axum::Router;
use clock::{Clock, SystemClock};
use db::Database;
use jwt::{TokenConfig, TokenIssuer};
use notify::LogNotifier;
use password::{CredentialVerifier, HashConfig, PasswordError};
use random::{OsRandom, RandomSource};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::{Notifier, SessionStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Access and email verification token lifetimes
    pub tokens: TokenConfig,
    /// Password KDF cost and salt length
    pub hashing: HashConfig,
    /// Refresh lifetime, session cap, and signup isolation
    pub sessions: SessionSettings,
    /// Time between expired-session cleanup runs
    pub cleanup_interval: Duration,
}

/// Sources of time, randomness, and outbound delivery.
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            random: Arc::new(OsRandom),
            notifier: Arc::new(LogNotifier),
        }
    }
}

/// Everything a running server owns. Built once at startup and torn down in
/// order by [`AppContext::shutdown`].
pub struct AppContext {
    pub db: Database,
    pub auth: Arc<AuthCoordinator>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    cleanup_interval: Duration,
    cleanup: Option<JoinHandle<()>>,
}

impl AppContext {
    pub fn new(config: ServerConfig, services: Services) -> Result<Self, PasswordError> {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.tokens, services.clock.clone());
        let credentials = CredentialVerifier::new(config.hashing, services.random.clone())?;
        let sessions: Arc<dyn SessionStore> = Arc::new(config.db.sessions());

        let auth = AuthCoordinator::new(
            tokens,
            credentials,
            Collaborators {
                users: Arc::new(config.db.users()),
                sessions: sessions.clone(),
                notifier: services.notifier,
            },
            services.clock.clone(),
            services.random,
            config.sessions,
        );

        Ok(Self {
            db: config.db,
            auth: Arc::new(auth),
            sessions,
            clock: services.clock,
            cleanup_interval: config.cleanup_interval,
            cleanup: None,
        })
    }

    /// Run cleanup once and spawn the background scheduler.
    /// Call this before starting the server.
    pub async fn start_cleanup(&mut self) {
        cleanup::run_cleanup(self.sessions.as_ref(), self.clock.as_ref()).await;
        if let Some(previous) = self.cleanup.replace(cleanup::spawn_cleanup_scheduler(
            self.sessions.clone(),
            self.clock.clone(),
            self.cleanup_interval,
        )) {
            previous.abort();
        }
    }

    /// Stop background work, then close the database.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.db.close().await;
        info!("Shutdown complete");
    }
}

/// Create the application router.
pub fn create_app(ctx: &AppContext) -> Router {
    Router::new().nest("/api", create_api_router(ctx.auth.clone()))
}

/// Serve on `listener` until `signal` resolves, then tear the context down.
pub async fn run_server<F>(
    ctx: AppContext,
    listener: TcpListener,
    signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&ctx);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await;
    ctx.shutdown().await;
    result
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the task handle and the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    mut ctx: AppContext,
    port: u16,
) -> Result<(JoinHandle<Result<(), std::io::Error>>, SocketAddr), std::io::Error> {
    ctx.start_cleanup().await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(run_server(ctx, listener, std::future::pending()));

    Ok((handle, local_addr))
}

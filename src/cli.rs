//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::ServerConfig;
use crate::auth::{DEFAULT_REFRESH_TTL_SECS, SessionSettings};
use crate::cleanup::DEFAULT_CLEANUP_INTERVAL;
use crate::db::Database;
use crate::jwt::{
    DEFAULT_ACCESS_TTL_SECS, DEFAULT_EMAIL_VERIFY_TTL_SECS, MAX_TTL_SECS, TokenConfig,
};
use crate::password::{DEFAULT_SALT_LENGTH, HashConfig, MAX_SALT_LENGTH};
use crate::store::Isolation;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "authkeep",
    about = "Credential and session lifecycle service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "AUTHKEEP_PORT", default_value = "7300")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "AUTHKEEP_DATABASE", default_value = "authkeep.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ACCESS_TTL_SECS, value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS))]
    pub access_ttl: u64,

    /// Refresh token and session lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_TTL_SECS, value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS))]
    pub refresh_ttl: u64,

    /// Email verification token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_EMAIL_VERIFY_TTL_SECS, value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS))]
    pub email_verify_ttl: u64,

    /// Password salt length in bytes
    #[arg(
        long,
        default_value_t = DEFAULT_SALT_LENGTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(argon2::MIN_SALT_LEN as u64..=MAX_SALT_LENGTH as u64)
    )]
    pub salt_length: usize,

    /// argon2id memory cost in KiB
    #[arg(long, default_value_t = argon2::Params::DEFAULT_M_COST)]
    pub argon2_memory_kib: u32,

    /// argon2id iterations
    #[arg(long, default_value_t = argon2::Params::DEFAULT_T_COST)]
    pub argon2_iterations: u32,

    /// argon2id lanes
    #[arg(long, default_value_t = argon2::Params::DEFAULT_P_COST)]
    pub argon2_parallelism: u32,

    /// Transaction isolation for the signup uniqueness check and insert
    #[arg(long, value_enum, default_value_t = Isolation::Immediate)]
    pub signup_isolation: Isolation,

    /// Keep at most this many sessions per user, dropping the oldest (unlimited if unset)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_sessions_per_user: Option<u32>,

    /// Seconds between expired-session cleanup runs
    #[arg(long, default_value_t = DEFAULT_CLEANUP_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        tokens: TokenConfig {
            access_ttl_secs: args.access_ttl,
            email_verify_ttl_secs: args.email_verify_ttl,
        },
        hashing: HashConfig {
            memory_kib: args.argon2_memory_kib,
            iterations: args.argon2_iterations,
            parallelism: args.argon2_parallelism,
            salt_length: args.salt_length,
        },
        sessions: SessionSettings {
            refresh_ttl_secs: args.refresh_ttl,
            max_sessions_per_user: args.max_sessions_per_user,
            signup_isolation: args.signup_isolation,
        },
        cleanup_interval: Duration::from_secs(args.cleanup_interval),
    }
}

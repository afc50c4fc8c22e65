//! Scheduled removal of expired sessions.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::clock::Clock;
use crate::store::SessionStore;

/// Interval between cleanup runs when none is configured.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of sessions removed.
pub async fn run_cleanup(sessions: &dyn SessionStore, clock: &dyn Clock) -> u64 {
    match sessions.delete_expired(clock.now()).await {
        Ok(count) if count > 0 => {
            info!("Cleaned up {} expired sessions", count);
            count
        }
        Ok(_) => 0,
        Err(e) => {
            error!("Failed to clean up expired sessions: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically, starting now.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            run_cleanup(sessions.as_ref(), clock.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::Database;
    use crate::store::{Isolation, NewSession, NewUser, UserRepository, UserRole};

    async fn seed(db: &Database) {
        let users = db.users();
        let mut tx = users.begin(Isolation::Immediate).await.unwrap();
        let user_id = tx
            .insert(&NewUser {
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                role: UserRole::User,
                password_hash: "aGFzaA==".to_string(),
                password_salt: "c2FsdA==".to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let sessions = db.sessions();
        for (client_id, expires_at) in [("c1", 100), ("c2", 200), ("c3", 300)] {
            sessions
                .create_or_replace(&NewSession {
                    user_id,
                    client_id: client_id.to_string(),
                    token_id: "t".to_string(),
                    expires_at,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_cleanup_uses_clock() {
        let db = Database::open(":memory:").await.unwrap();
        seed(&db).await;
        let sessions = db.sessions();
        let clock = ManualClock::new(50);

        assert_eq!(run_cleanup(&sessions, &clock).await, 0);
        clock.set(200);
        assert_eq!(run_cleanup(&sessions, &clock).await, 2);
        clock.set(1_000);
        assert_eq!(run_cleanup(&sessions, &clock).await, 1);
    }

    #[tokio::test]
    async fn test_scheduler_runs_immediately() {
        let db = Database::open(":memory:").await.unwrap();
        seed(&db).await;
        let handle = spawn_cleanup_scheduler(
            Arc::new(db.sessions()),
            Arc::new(ManualClock::new(1_000)),
            Duration::from_secs(3600),
        );

        let mut remaining = 3;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
                .fetch_one(db.pool())
                .await
                .unwrap();
            remaining = row.0;
            if remaining == 0 {
                break;
            }
        }
        handle.abort();
        assert_eq!(remaining, 0);
    }
}

//! Persisted refresh sessions.
//!
//! One row per client identifier. The row's `token_id` is the only refresh
//! token id that may be exchanged for that client; rotation swaps it with a
//! conditional update so at most one of two racing refreshes wins.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::store::{NewSession, Rotation, SessionStore, StoreError, UserInfo, UserRole};

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Unix seconds as stored in sqlite's signed INTEGER column.
fn to_db_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_or_replace(&self, session: &NewSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (client_id, user_id, token_id, expires_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(client_id) DO UPDATE SET
                user_id = excluded.user_id,
                token_id = excluded.token_id,
                expires_at = excluded.expires_at",
        )
        .bind(&session.client_id)
        .bind(session.user_id)
        .bind(&session.token_id)
        .bind(to_db_time(session.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate(&self, rotation: &Rotation) -> Result<UserInfo, StoreError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let owner: Option<(i64,)> = sqlx::query_as(
            "UPDATE sessions SET token_id = ?, expires_at = ?
             WHERE client_id = ? AND token_id = ?
             RETURNING user_id",
        )
        .bind(&rotation.new_token_id)
        .bind(to_db_time(rotation.new_expires_at))
        .bind(&rotation.client_id)
        .bind(&rotation.old_token_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = owner else {
            return Err(StoreError::SessionInvalid);
        };

        let user: Option<(i64, String, String, String)> =
            sqlx::query_as("SELECT id, username, email, role FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        // Sessions cascade with their user, so a missing owner means the row is stale
        let Some((id, username, email, role)) = user else {
            return Err(StoreError::SessionInvalid);
        };

        tx.commit().await?;

        Ok(UserInfo {
            id,
            username,
            email,
            role: UserRole::from_str(&role),
        })
    }

    async fn delete(&self, client_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE client_id = ?")
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn trim_user_sessions(&self, user_id: i64, keep: u32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_id = ? AND id NOT IN (
                SELECT id FROM sessions WHERE user_id = ? ORDER BY id DESC LIMIT ?
             )",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(to_db_time(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

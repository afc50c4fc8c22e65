use async_trait::async_trait;
use sqlx::Sqlite;
use sqlx::sqlite::SqlitePool;

use crate::store::{
    Availability, Isolation, NewUser, StoreError, User, UserInfo, UserRepository, UserRole,
    UserTransaction,
};

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    active: i32,
    role: String,
    password_hash: String,
    password_salt: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            active: row.active != 0,
            role: UserRole::from_str(&row.role),
            password_hash: row.password_hash,
            password_salt: row.password_salt,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserInfoRow {
    id: i64,
    username: String,
    email: String,
    role: String,
}

impl From<UserInfoRow> for UserInfo {
    fn from(row: UserInfoRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            role: UserRole::from_str(&row.role),
        }
    }
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn UserTransaction>, StoreError> {
        let statement = match isolation {
            Isolation::Deferred => "BEGIN DEFERRED",
            Isolation::Immediate => "BEGIN IMMEDIATE",
            Isolation::Exclusive => "BEGIN EXCLUSIVE",
        };
        let tx = self.pool.begin_with(statement).await?;
        Ok(Box::new(SqliteUserTransaction { tx }))
    }

    async fn activate_if_inactive(&self, email: &str) -> Result<UserInfo, StoreError> {
        let row: Option<UserInfoRow> = sqlx::query_as(
            "UPDATE users SET active = 1 WHERE email = ? AND active = 0 RETURNING id, username, email, role",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        let exists: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        if exists.0 != 0 {
            Err(StoreError::AlreadyActive)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, active, role, password_hash, password_salt FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, active, role, password_hash, password_salt FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }
}

/// Signup transaction. Rolled back by sqlx when dropped uncommitted.
struct SqliteUserTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl UserTransaction for SqliteUserTransaction {
    async fn check_free(
        &mut self,
        username: &str,
        email: &str,
    ) -> Result<Availability, StoreError> {
        let taken: (i64, i64) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?), EXISTS(SELECT 1 FROM users WHERE email = ?)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Availability {
            username_taken: taken.0 != 0,
            email_taken: taken.1 != 0,
        })
    }

    async fn insert(&mut self, user: &NewUser) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, email, active, role, password_hash, password_salt) VALUES (?, ?, 0, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(&user.password_salt)
        .execute(&mut *self.tx)
        .await
        .map_err(unique_conflict)?;
        Ok(result.last_insert_rowid())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Map a unique constraint failure on `users` to the column that collided.
fn unique_conflict(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            return StoreError::Conflict {
                username: message.contains("users.username"),
                email: message.contains("users.email"),
            };
        }
    }
    e.into()
}

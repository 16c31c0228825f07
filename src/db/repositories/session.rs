//! Session repository
//!
//! Row storage for sessions:
//! - `SessionRepository` trait defining the operations the session store needs
//! - `SqlxSessionRepository` implementing it for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{NewSession, Session};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session row and return it with its assigned ID
    async fn create(&self, session: &NewSession) -> Result<Session>;

    /// Check whether any session uses this token
    async fn exists(&self, token: &str) -> Result<bool>;

    /// Get session by token
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Overwrite the soft expiry of a session
    async fn update_expiry(&self, token: &str, expiry_date: DateTime<Utc>) -> Result<()>;

    /// Delete a session. Deleting a missing token is not an error.
    async fn delete(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete sessions whose soft expiry is before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_BY_TOKEN: &str = r#"
    SELECT id, token, user_id, expiry_date, max_expiry_date
    FROM sessions
    WHERE token = ?
"#;

const INSERT: &str = r#"
    INSERT INTO sessions (token, user_id, expiry_date, max_expiry_date)
    VALUES (?, ?, ?, ?)
"#;

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &NewSession) -> Result<Session> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT)
                .bind(&session.token)
                .bind(session.user_id)
                .bind(session.expiry_date)
                .bind(session.max_expiry_date)
                .execute(pool)
                .await
                .context("Failed to create session")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => {
                let id = sqlx::query(INSERT)
                    .bind(&session.token)
                    .bind(session.user_id)
                    .bind(session.expiry_date)
                    .bind(session.max_expiry_date)
                    .execute(pool)
                    .await
                    .context("Failed to create session")?
                    .last_insert_id();
                i64::try_from(id).context("Session ID out of range")?
            }
        };

        Ok(Session {
            id,
            token: session.token.clone(),
            user_id: session.user_id,
            expiry_date: session.expiry_date,
            max_expiry_date: session.max_expiry_date,
        })
    }

    async fn exists(&self, token: &str) -> Result<bool> {
        const SQL: &str = "SELECT COUNT(*) AS n FROM sessions WHERE token = ?";

        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(token)
                .fetch_one(pool)
                .await
                .context("Failed to check session token")?
                .get("n"),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(token)
                .fetch_one(pool)
                .await
                .context("Failed to check session token")?
                .get("n"),
        };

        Ok(count > 0)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        let session = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SELECT_BY_TOKEN)
                .bind(token)
                .fetch_optional(pool)
                .await
                .context("Failed to get session by token")?
                .map(|row| row_to_session_sqlite(&row)),
            Backend::Mysql(pool) => sqlx::query(SELECT_BY_TOKEN)
                .bind(token)
                .fetch_optional(pool)
                .await
                .context("Failed to get session by token")?
                .map(|row| row_to_session_mysql(&row)),
        };

        Ok(session)
    }

    async fn update_expiry(&self, token: &str, expiry_date: DateTime<Utc>) -> Result<()> {
        const SQL: &str = "UPDATE sessions SET expiry_date = ? WHERE token = ?";

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(SQL)
                    .bind(expiry_date)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to update session expiry")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(SQL)
                    .bind(expiry_date)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to update session expiry")?;
            }
        }

        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        const SQL: &str = "DELETE FROM sessions WHERE token = ?";

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(SQL)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to delete session")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(SQL)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to delete session")?;
            }
        }

        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        const SQL: &str = "DELETE FROM sessions WHERE user_id = ?";

        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected(),
        };

        Ok(affected)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        const SQL: &str = "DELETE FROM sessions WHERE expiry_date < ?";

        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };

        Ok(affected)
    }
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        token: row.get("token"),
        user_id: row.get("user_id"),
        expiry_date: row.get("expiry_date"),
        max_expiry_date: row.get("max_expiry_date"),
    }
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Session {
    Session {
        id: row.get("id"),
        token: row.get("token"),
        user_id: row.get("user_id"),
        expiry_date: row.get("expiry_date"),
        max_expiry_date: row.get("max_expiry_date"),
    }
}

//! API token repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::AuthToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait TokenAuthRepository: Send + Sync {
    /// Insert a token row and return it with its assigned ID
    async fn create(&self, token: &str, user_id: i64) -> Result<AuthToken>;

    /// Check whether the user already holds a token
    async fn exists_for_user(&self, user_id: i64) -> Result<bool>;

    /// Get the token row by its token value
    async fn get_by_token(&self, token: &str) -> Result<Option<AuthToken>>;

    /// Delete a token. Deleting a missing token is not an error.
    async fn delete(&self, token: &str) -> Result<()>;
}

pub struct SqlxTokenAuthRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenAuthRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenAuthRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenAuthRepository for SqlxTokenAuthRepository {
    async fn create(&self, token: &str, user_id: i64) -> Result<AuthToken> {
        const SQL: &str = "INSERT INTO token_auth (token, user_id) VALUES (?, ?)";

        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(token)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to create API token")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => {
                let id = sqlx::query(SQL)
                    .bind(token)
                    .bind(user_id)
                    .execute(pool)
                    .await
                    .context("Failed to create API token")?
                    .last_insert_id();
                i64::try_from(id).context("Token ID out of range")?
            }
        };

        Ok(AuthToken {
            id,
            token: token.to_string(),
            user_id,
        })
    }

    async fn exists_for_user(&self, user_id: i64) -> Result<bool> {
        const SQL: &str = "SELECT COUNT(*) AS n FROM token_auth WHERE user_id = ?";

        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to check API tokens for user")?
                .get("n"),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to check API tokens for user")?
                .get("n"),
        };

        Ok(count > 0)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<AuthToken>> {
        const SQL: &str = "SELECT id, token, user_id FROM token_auth WHERE token = ?";

        let found = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(token)
                .fetch_optional(pool)
                .await
                .context("Failed to get API token")?
                .map(|row| AuthToken {
                    id: row.get("id"),
                    token: row.get("token"),
                    user_id: row.get("user_id"),
                }),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(token)
                .fetch_optional(pool)
                .await
                .context("Failed to get API token")?
                .map(|row| AuthToken {
                    id: row.get("id"),
                    token: row.get("token"),
                    user_id: row.get("user_id"),
                }),
        };

        Ok(found)
    }

    async fn delete(&self, token: &str) -> Result<()> {
        const SQL: &str = "DELETE FROM token_auth WHERE token = ?";

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(SQL)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to delete API token")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(SQL)
                    .bind(token)
                    .execute(pool)
                    .await
                    .context("Failed to delete API token")?;
            }
        }

        Ok(())
    }
}

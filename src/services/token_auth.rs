//! API token authentication
//!
//! Long-lived bearer tokens for non-browser clients. Unlike sessions they
//! never expire and stay valid until removed.

use crate::db::repositories::TokenAuthRepository;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenAuthError {
    #[error("User {0} already has a token")]
    AlreadyExists(i64),

    #[error("Token not recognised")]
    NotRecognised,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Persistent API token store
#[derive(Clone)]
pub struct TokenAuthStore {
    repo: Arc<dyn TokenAuthRepository>,
}

impl TokenAuthStore {
    pub fn new(repo: Arc<dyn TokenAuthRepository>) -> Self {
        Self { repo }
    }

    /// Issue a new token for `user_id`.
    ///
    /// With `one_per_user`, a user who already holds a token is refused.
    pub async fn create_token(
        &self,
        user_id: i64,
        one_per_user: bool,
    ) -> Result<String, TokenAuthError> {
        if one_per_user
            && self
                .repo
                .exists_for_user(user_id)
                .await
                .context("Failed to check existing API tokens")?
        {
            return Err(TokenAuthError::AlreadyExists(user_id));
        }

        let token = Uuid::new_v4().to_string();
        self.repo
            .create(&token, user_id)
            .await
            .context("Failed to create API token")?;

        tracing::info!("Issued API token for user {}", user_id);
        Ok(token)
    }

    pub async fn get_user_id(&self, token: &str) -> Result<Option<i64>, TokenAuthError> {
        let found = self
            .repo
            .get_by_token(token)
            .await
            .context("Failed to get API token")?;
        Ok(found.map(|t| t.user_id))
    }

    /// Revoke a token. Unknown tokens are ignored.
    pub async fn remove_token(&self, token: &str) -> Result<(), TokenAuthError> {
        self.repo
            .delete(token)
            .await
            .context("Failed to delete API token")?;
        Ok(())
    }
}

/// Resolves a bearer token to the user it acts for
#[async_trait]
pub trait TokenAuthProvider: Send + Sync {
    async fn get_user_id(&self, token: &str) -> Result<i64, TokenAuthError>;
}

/// Accepts a fixed set of shared secrets.
///
/// Meant for trusted internal clients. Every accepted token acts as the same
/// principal.
pub struct SecretTokenAuthProvider {
    tokens: HashSet<String>,
    principal_id: i64,
}

impl SecretTokenAuthProvider {
    pub fn new<I, S>(tokens: I, principal_id: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            principal_id,
        }
    }
}

#[async_trait]
impl TokenAuthProvider for SecretTokenAuthProvider {
    async fn get_user_id(&self, token: &str) -> Result<i64, TokenAuthError> {
        if self.tokens.contains(token) {
            Ok(self.principal_id)
        } else {
            Err(TokenAuthError::NotRecognised)
        }
    }
}

/// Looks tokens up in a `TokenAuthStore`
pub struct StoredTokenAuthProvider {
    store: TokenAuthStore,
}

impl StoredTokenAuthProvider {
    pub fn new(store: TokenAuthStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenAuthProvider for StoredTokenAuthProvider {
    async fn get_user_id(&self, token: &str) -> Result<i64, TokenAuthError> {
        self.store
            .get_user_id(token)
            .await?
            .ok_or(TokenAuthError::NotRecognised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTokenAuthRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_store() -> TokenAuthStore {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        TokenAuthStore::new(SqlxTokenAuthRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_create_and_resolve_token() {
        let store = setup_store().await;

        let token = store.create_token(5, true).await.unwrap();

        assert!(Uuid::parse_str(&token).is_ok());
        assert_eq!(store.get_user_id(&token).await.unwrap(), Some(5));
        assert_eq!(store.get_user_id("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_one_per_user() {
        let store = setup_store().await;
        store.create_token(5, true).await.unwrap();

        let result = store.create_token(5, true).await;
        assert!(matches!(result, Err(TokenAuthError::AlreadyExists(5))));

        let second = store.create_token(5, false).await.unwrap();
        assert_eq!(store.get_user_id(&second).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_remove_token() {
        let store = setup_store().await;
        let token = store.create_token(5, true).await.unwrap();

        store.remove_token(&token).await.unwrap();
        store.remove_token(&token).await.unwrap();

        assert_eq!(store.get_user_id(&token).await.unwrap(), None);
        // The user may now be issued a fresh token
        assert!(store.create_token(5, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_secret_provider() {
        let provider = SecretTokenAuthProvider::new(["alpha", "beta"], 0);

        assert_eq!(provider.get_user_id("beta").await.unwrap(), 0);
        assert!(matches!(
            provider.get_user_id("gamma").await,
            Err(TokenAuthError::NotRecognised)
        ));
    }

    #[tokio::test]
    async fn test_stored_provider() {
        let store = setup_store().await;
        let token = store.create_token(9, true).await.unwrap();
        let provider = StoredTokenAuthProvider::new(store);

        assert_eq!(provider.get_user_id(&token).await.unwrap(), 9);
        assert!(matches!(
            provider.get_user_id("nope").await,
            Err(TokenAuthError::NotRecognised)
        ));
    }
}

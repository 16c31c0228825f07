//! Session store
//!
//! Issues, validates, renews and revokes opaque session tokens.
//!
//! Each session carries two expiry dates. `expiry_date` is short and slides
//! forward when a client keeps using the session close to its expiry.
//! `max_expiry_date` is fixed at creation, so a token can never outlive it
//! no matter how often it is renewed.
//!
//! Invalid tokens are not errors: missing, soft-expired and hard-expired
//! sessions all read as `None`, and callers treat them alike. Only storage
//! failures surface as `SessionError::InternalError`.

use crate::config::SessionConfig;
use crate::db::repositories::SessionRepository;
use crate::models::{NewSession, Session};
use crate::services::clock::{system_clock, Clock};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use std::sync::Arc;

/// Default soft expiry for new sessions
const DEFAULT_SESSION_EXPIRY_HOURS: i64 = 1;

/// Default hard ceiling for new sessions
const DEFAULT_SESSION_MAX_EXPIRY_DAYS: i64 = 7;

/// Random bytes behind each session token
pub const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No usable session for the token. Deliberately says nothing about why.
    #[error("Session not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Generate a URL-safe session token from the OS random source.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|e| anyhow!("Failed to read from the OS random source: {}", e))?;
    Ok(BASE64URL_NOPAD.encode(&bytes))
}

/// `at + by`, clamped to the representable range instead of panicking
fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(if by < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
    max_expiry: Duration,
}

impl SessionStore {
    /// Session store with the default lifetimes (1 hour, capped at 7 days)
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            clock: system_clock(),
            expiry: Duration::hours(DEFAULT_SESSION_EXPIRY_HOURS),
            max_expiry: Duration::days(DEFAULT_SESSION_MAX_EXPIRY_DAYS),
        }
    }

    pub fn from_config(repo: Arc<dyn SessionRepository>, config: &SessionConfig) -> Self {
        Self::new(repo).with_lifetimes(config.expiry(), config.max_expiry())
    }

    /// Override the default lifetimes given to new sessions
    pub fn with_lifetimes(mut self, expiry: Duration, max_expiry: Duration) -> Self {
        self.expiry = expiry;
        self.max_expiry = max_expiry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create and persist a session for `user_id`.
    ///
    /// Missing dates default to the configured lifetimes. An `expiry_date`
    /// past the `max_expiry_date` is pulled back to it.
    pub async fn create_session(
        &self,
        user_id: i64,
        expiry_date: Option<DateTime<Utc>>,
        max_expiry_date: Option<DateTime<Utc>>,
    ) -> Result<Session, SessionError> {
        let token = self.unused_token().await?;

        let now = self.clock.now();
        let max_expiry_date =
            max_expiry_date.unwrap_or_else(|| saturating_add(now, self.max_expiry));
        let expiry_date = expiry_date
            .unwrap_or_else(|| saturating_add(now, self.expiry))
            .min(max_expiry_date);

        let session = self
            .repo
            .create(&NewSession {
                token,
                user_id,
                expiry_date,
                max_expiry_date,
            })
            .await
            .context("Failed to create session")?;

        tracing::debug!(
            "Created session {} for user {}, expires {}",
            session.id,
            user_id,
            session.expiry_date
        );

        Ok(session)
    }

    /// Generate tokens until one is not already in use.
    async fn unused_token(&self) -> Result<String, SessionError> {
        loop {
            let token = generate_session_token()?;
            if !self
                .repo
                .exists(&token)
                .await
                .context("Failed to check session token")?
            {
                return Ok(token);
            }
            tracing::warn!("Generated a session token that is already in use, retrying");
        }
    }

    /// Resolve a token to its user.
    ///
    /// If `increase_expiry` is set and the session would expire within that
    /// window, its `expiry_date` is pushed forward by the window, never past
    /// `max_expiry_date`. Sessions that have already expired are not revived.
    pub async fn get_user_id(
        &self,
        token: &str,
        increase_expiry: Option<Duration>,
    ) -> Result<Option<i64>, SessionError> {
        let session = match self
            .repo
            .get_by_token(token)
            .await
            .context("Failed to get session")?
        {
            Some(session) => session,
            None => return Ok(None),
        };

        let now = self.clock.now();
        if !session.is_valid_at(now) {
            return Ok(None);
        }

        if let Some(window) = increase_expiry {
            if session.expiry_date - now < window {
                let extended =
                    saturating_add(session.expiry_date, window).min(session.max_expiry_date);
                if extended > session.expiry_date {
                    self.repo
                        .update_expiry(token, extended)
                        .await
                        .context("Failed to extend session")?;
                    tracing::debug!("Extended session {} to {}", session.id, extended);
                }
            }
        }

        Ok(Some(session.user_id))
    }

    /// Like `get_user_id`, with an invalid token reported as `NotFound`.
    pub async fn authenticate(
        &self,
        token: &str,
        increase_expiry: Option<Duration>,
    ) -> Result<i64, SessionError> {
        self.get_user_id(token, increase_expiry)
            .await?
            .ok_or(SessionError::NotFound)
    }

    /// Delete the session. Unknown tokens are ignored.
    pub async fn remove_session(&self, token: &str) -> Result<(), SessionError> {
        self.repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Delete every session belonging to `user_id`, returning how many went.
    pub async fn remove_user_sessions(&self, user_id: i64) -> Result<u64, SessionError> {
        let removed = self
            .repo
            .delete_by_user(user_id)
            .await
            .context("Failed to delete user sessions")?;
        tracing::info!("Removed {} session(s) for user {}", removed, user_id);
        Ok(removed)
    }

    /// Delete every session whose soft expiry has passed.
    pub async fn clean_expired(&self) -> Result<u64, SessionError> {
        let removed = self
            .repo
            .delete_expired(self.clock.now())
            .await
            .context("Failed to delete expired sessions")?;
        tracing::info!("Removed {} expired session(s)", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxSessionRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::services::clock::ManualClock;
    use std::collections::HashSet;

    async fn setup_store() -> (SessionStore, Arc<ManualClock>, Arc<dyn SessionRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::boxed(pool);
        let clock = Arc::new(ManualClock::starting_now());
        let store = SessionStore::new(repo.clone()).with_clock(clock.clone());
        (store, clock, repo)
    }

    async fn stored(repo: &Arc<dyn SessionRepository>, token: &str) -> Session {
        repo.get_by_token(token)
            .await
            .expect("Query failed")
            .expect("Session not found")
    }

    #[test]
    fn test_generated_token_is_url_safe() {
        let token = generate_session_token().expect("Failed to generate token");

        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_create_session_uses_default_lifetimes() {
        let (store, clock, _repo) = setup_store().await;
        let now = clock.now();

        let session = store.create_session(7, None, None).await.unwrap();

        assert_eq!(session.user_id, 7);
        assert_eq!(session.expiry_date, now + Duration::hours(1));
        assert_eq!(session.max_expiry_date, now + Duration::days(7));
    }

    #[tokio::test]
    async fn test_create_session_with_overrides() {
        let (store, clock, repo) = setup_store().await;
        let now = clock.now();
        let expiry = now + Duration::minutes(5);
        let max_expiry = now + Duration::hours(2);

        let session = store
            .create_session(7, Some(expiry), Some(max_expiry))
            .await
            .unwrap();

        assert_eq!(session.expiry_date, expiry);
        assert_eq!(session.max_expiry_date, max_expiry);
        assert_eq!(stored(&repo, &session.token).await, session);
    }

    #[tokio::test]
    async fn test_create_session_clamps_expiry_to_ceiling() {
        let (store, clock, _repo) = setup_store().await;
        let now = clock.now();
        let max_expiry = now + Duration::minutes(10);

        let session = store
            .create_session(7, Some(now + Duration::days(1)), Some(max_expiry))
            .await
            .unwrap();

        assert_eq!(session.expiry_date, max_expiry);
    }

    #[tokio::test]
    async fn test_from_config_lifetimes() {
        let (_store, clock, repo) = setup_store().await;
        let config = SessionConfig {
            expiry_seconds: 600,
            max_expiry_seconds: 3600,
            ..SessionConfig::default()
        };
        let store = SessionStore::from_config(repo, &config).with_clock(clock.clone());

        let session = store.create_session(1, None, None).await.unwrap();

        assert_eq!(session.expiry_date, clock.now() + Duration::minutes(10));
        assert_eq!(session.max_expiry_date, clock.now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let (store, _clock, _repo) = setup_store().await;
        let mut tokens = HashSet::new();

        for user_id in 0..1000 {
            let session = store.create_session(user_id, None, None).await.unwrap();
            tokens.insert(session.token);
        }

        assert_eq!(tokens.len(), 1000);
    }

    #[tokio::test]
    async fn test_get_user_id_valid_and_missing() {
        let (store, _clock, _repo) = setup_store().await;
        let session = store.create_session(11, None, None).await.unwrap();

        assert_eq!(store.get_user_id(&session.token, None).await.unwrap(), Some(11));
        assert_eq!(store.get_user_id("no-such-token", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_user_id_soft_expired() {
        let (store, clock, _repo) = setup_store().await;
        let session = store.create_session(11, None, None).await.unwrap();

        clock.advance(Duration::hours(1));

        // Expiry is reached exactly; the hard ceiling is still days away.
        assert_eq!(store.get_user_id(&session.token, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_user_id_hard_expired() {
        let (store, clock, _repo) = setup_store().await;
        let now = clock.now();
        let session = store
            .create_session(11, Some(now + Duration::hours(1)), Some(now + Duration::minutes(1)))
            .await
            .unwrap();

        clock.advance(Duration::minutes(2));

        assert_eq!(store.get_user_id(&session.token, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_renewal_inside_window_extends_by_window() {
        let (store, clock, repo) = setup_store().await;
        let now = clock.now();
        let session = store
            .create_session(1, Some(now + Duration::minutes(10)), None)
            .await
            .unwrap();

        let user_id = store
            .get_user_id(&session.token, Some(Duration::minutes(30)))
            .await
            .unwrap();

        assert_eq!(user_id, Some(1));
        assert_eq!(
            stored(&repo, &session.token).await.expiry_date,
            session.expiry_date + Duration::minutes(30)
        );
    }

    #[tokio::test]
    async fn test_renewal_outside_window_leaves_expiry() {
        let (store, clock, repo) = setup_store().await;
        let now = clock.now();
        let session = store
            .create_session(1, Some(now + Duration::minutes(40)), None)
            .await
            .unwrap();

        store
            .get_user_id(&session.token, Some(Duration::minutes(30)))
            .await
            .unwrap();

        assert_eq!(stored(&repo, &session.token).await.expiry_date, session.expiry_date);
    }

    #[tokio::test]
    async fn test_renewal_stops_at_ceiling() {
        let (store, clock, repo) = setup_store().await;
        let now = clock.now();
        let max_expiry = now + Duration::minutes(20);
        let session = store
            .create_session(1, Some(now + Duration::minutes(10)), Some(max_expiry))
            .await
            .unwrap();

        store
            .get_user_id(&session.token, Some(Duration::minutes(30)))
            .await
            .unwrap();

        assert_eq!(stored(&repo, &session.token).await.expiry_date, max_expiry);
    }

    #[tokio::test]
    async fn test_huge_renewal_window_stops_at_ceiling() {
        let (store, clock, repo) = setup_store().await;
        let now = clock.now();
        let max_expiry = now + Duration::days(2);
        let session = store
            .create_session(1, Some(now + Duration::minutes(10)), Some(max_expiry))
            .await
            .unwrap();

        let user_id = store
            .get_user_id(&session.token, Some(Duration::MAX))
            .await
            .unwrap();

        assert_eq!(user_id, Some(1));
        assert_eq!(stored(&repo, &session.token).await.expiry_date, max_expiry);
    }

    #[tokio::test]
    async fn test_huge_lifetime_is_clamped_to_ceiling() {
        let (_store, clock, repo) = setup_store().await;
        let store = SessionStore::new(repo)
            .with_lifetimes(Duration::MAX, Duration::days(1))
            .with_clock(clock.clone());

        let session = store.create_session(1, None, None).await.unwrap();

        assert_eq!(session.max_expiry_date, clock.now() + Duration::days(1));
        assert_eq!(session.expiry_date, session.max_expiry_date);
    }

    #[test]
    fn test_saturating_add_bounds() {
        let now = Utc::now();

        assert_eq!(saturating_add(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(saturating_add(now, Duration::MIN), DateTime::<Utc>::MIN_UTC);
        assert_eq!(saturating_add(now, Duration::hours(1)), now + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_expired_session_is_not_renewed() {
        let (store, clock, repo) = setup_store().await;
        let session = store.create_session(1, None, None).await.unwrap();

        clock.advance(Duration::hours(2));
        let user_id = store
            .get_user_id(&session.token, Some(Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(user_id, None);
        assert_eq!(stored(&repo, &session.token).await.expiry_date, session.expiry_date);
    }

    #[tokio::test]
    async fn test_authenticate_reports_not_found() {
        let (store, _clock, _repo) = setup_store().await;

        let result = store.authenticate("missing", None).await;

        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_session_is_idempotent() {
        let (store, _clock, repo) = setup_store().await;
        let session = store.create_session(1, None, None).await.unwrap();

        store.remove_session(&session.token).await.unwrap();
        store.remove_session(&session.token).await.unwrap();
        store.remove_session("never-existed").await.unwrap();

        assert!(!repo.exists(&session.token).await.unwrap());
        assert!(!repo.exists("never-existed").await.unwrap());
        assert_eq!(store.get_user_id(&session.token, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_user_sessions() {
        let (store, _clock, _repo) = setup_store().await;
        let a = store.create_session(1, None, None).await.unwrap();
        let b = store.create_session(1, None, None).await.unwrap();
        let other = store.create_session(2, None, None).await.unwrap();

        assert_eq!(store.remove_user_sessions(1).await.unwrap(), 2);

        assert_eq!(store.get_user_id(&a.token, None).await.unwrap(), None);
        assert_eq!(store.get_user_id(&b.token, None).await.unwrap(), None);
        assert_eq!(store.get_user_id(&other.token, None).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_clean_expired() {
        let (store, clock, _repo) = setup_store().await;
        let now = clock.now();
        let short = store.create_session(1, None, None).await.unwrap();
        let long = store
            .create_session(2, Some(now + Duration::days(1)), None)
            .await
            .unwrap();

        clock.advance(Duration::hours(2));
        let removed = store.clean_expired().await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.get_user_id(&short.token, None).await.unwrap(), None);
        assert_eq!(store.get_user_id(&long.token, None).await.unwrap(), Some(2));
    }
}

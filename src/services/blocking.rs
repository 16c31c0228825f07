//! Blocking access to the session store
//!
//! For callers without an async runtime, such as scripts and synchronous
//! request handlers. Every call drives the async `SessionStore` to
//! completion on a private current-thread runtime.
//!
//! Must not be used from inside another tokio runtime: `block_on` panics
//! there.

use crate::config::{Config, DatabaseConfig};
use crate::db::{create_pool, migrations, repositories::SqlxSessionRepository};
use crate::models::Session;
use crate::services::session::{SessionError, SessionStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::runtime::{Builder, Runtime};

pub struct BlockingSessionStore {
    runtime: Runtime,
    inner: SessionStore,
}

impl BlockingSessionStore {
    /// Wrap an existing store.
    ///
    /// The store's database pool must have been created on `runtime`.
    pub fn new(runtime: Runtime, inner: SessionStore) -> Self {
        Self { runtime, inner }
    }

    /// Connect, migrate and build a store with default lifetimes.
    pub fn connect(database: &DatabaseConfig) -> Result<Self> {
        Self::connect_with(&Config {
            database: database.clone(),
            ..Config::default()
        })
    }

    /// Connect, migrate and build a store from full configuration.
    pub fn connect_with(config: &Config) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime")?;

        let inner = runtime.block_on(async {
            let pool = create_pool(&config.database).await?;
            migrations::run_migrations(&pool).await?;
            Ok::<_, anyhow::Error>(SessionStore::from_config(
                SqlxSessionRepository::boxed(pool),
                &config.sessions,
            ))
        })?;

        Ok(Self { runtime, inner })
    }

    /// The async store behind this handle
    pub fn inner(&self) -> &SessionStore {
        &self.inner
    }

    pub fn create_session(
        &self,
        user_id: i64,
        expiry_date: Option<DateTime<Utc>>,
        max_expiry_date: Option<DateTime<Utc>>,
    ) -> Result<Session, SessionError> {
        self.runtime
            .block_on(self.inner.create_session(user_id, expiry_date, max_expiry_date))
    }

    pub fn get_user_id(
        &self,
        token: &str,
        increase_expiry: Option<Duration>,
    ) -> Result<Option<i64>, SessionError> {
        self.runtime
            .block_on(self.inner.get_user_id(token, increase_expiry))
    }

    pub fn remove_session(&self, token: &str) -> Result<(), SessionError> {
        self.runtime.block_on(self.inner.remove_session(token))
    }

    pub fn clean_expired(&self) -> Result<u64, SessionError> {
        self.runtime.block_on(self.inner.clean_expired())
    }
}

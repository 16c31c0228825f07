//! Database layer
//!
//! Persistent storage for sessions and API tokens. Supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (when several server processes share one session store)
//!
//! The driver is selected from configuration. Repositories work against the
//! `DatabasePool` trait and match on `Backend` for driver-specific SQL.
//!
//! # Usage
//!
//! ```ignore
//! use sessionward::config::DatabaseConfig;
//! use sessionward::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

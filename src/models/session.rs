//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session entity for user authentication
///
/// `expiry_date` slides forward on renewal; `max_expiry_date` never moves,
/// which bounds the lifetime of a token that keeps being used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Surrogate key assigned by the store
    pub id: i64,
    /// Opaque session token, unique
    pub token: String,
    /// Associated user ID
    pub user_id: i64,
    /// Soft expiry, may be extended
    pub expiry_date: DateTime<Utc>,
    /// Hard expiry, never extended
    pub max_expiry_date: DateTime<Utc>,
}

/// Input for persisting a new session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub token: String,
    pub user_id: i64,
    pub expiry_date: DateTime<Utc>,
    pub max_expiry_date: DateTime<Utc>,
}

impl Session {
    /// A session is usable only while both expiry dates lie in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date > now && self.max_expiry_date > now
    }
}

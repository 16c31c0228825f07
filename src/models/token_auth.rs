//! API token model

use serde::{Deserialize, Serialize};

/// Long-lived bearer token for non-browser clients. Tokens never expire;
/// they are removed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
}

//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod session;
pub mod token_auth;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use token_auth::{SqlxTokenAuthRepository, TokenAuthRepository};

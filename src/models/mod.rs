//! Data models
//!
//! Entities persisted by the stores:
//! - `Session`: browser session bound to a user, with sliding and hard expiry
//! - `AuthToken`: long-lived API token bound to a user

mod session;
mod token_auth;

pub use session::{NewSession, Session};
pub use token_auth::AuthToken;

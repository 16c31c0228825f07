//! Services layer
//!
//! Session, API token and rate limiting logic on top of the repositories.

pub mod blocking;
pub mod clock;
pub mod rate_limiter;
pub mod session;
pub mod token_auth;

pub use blocking::BlockingSessionStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limiter::{InMemoryLimitProvider, RateLimitExceeded, RateLimitProvider};
pub use session::{generate_session_token, SessionError, SessionStore};
pub use token_auth::{
    SecretTokenAuthProvider, StoredTokenAuthProvider, TokenAuthError, TokenAuthProvider,
    TokenAuthStore,
};

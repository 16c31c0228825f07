//! API layer - HTTP middleware
//!
//! Plugs the session store, token store and rate limiter into axum routers.

pub mod middleware;

pub use middleware::{
    get_authenticated_user, is_excluded_path, rate_limit, session_auth, token_auth, ApiError,
    AuthenticatedUser, SessionAuth, TokenAuth,
};

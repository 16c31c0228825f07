//! API middleware
//!
//! Contains middleware for:
//! - Rate limiting by peer address
//! - Session cookie authentication
//! - Bearer token authentication
//!
//! Each is an `axum::middleware::from_fn_with_state` function. Authenticated
//! requests carry an `AuthenticatedUser` extension.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::services::rate_limiter::RateLimitProvider;
use crate::services::session::SessionStore;
use crate::services::token_auth::{TokenAuthError, TokenAuthProvider};

/// ID of the user an authenticated request acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Rejects clients that go over the provider's limit.
///
/// Needs the router to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn rate_limit(
    State(limiter): State<Arc<dyn RateLimitProvider>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>().copied()
    else {
        return (StatusCode::BAD_REQUEST, "Client host can't be found.").into_response();
    };

    if limiter.increment(&addr.ip().to_string()).await.is_err() {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }

    next.run(request).await
}

// ============================================================================
// Session authentication
// ============================================================================

/// State for `session_auth`
#[derive(Clone)]
pub struct SessionAuth {
    pub store: SessionStore,
    pub cookie_name: String,
    /// Renewal window passed to `SessionStore::get_user_id`
    pub increase_expiry: Option<Duration>,
    /// Let requests without a valid session through, minus the user
    pub allow_unauthenticated: bool,
    /// Paths that skip the check. A trailing `*` matches by prefix.
    pub excluded_paths: Vec<String>,
}

impl SessionAuth {
    pub fn new(store: SessionStore, config: &SessionConfig) -> Self {
        Self {
            store,
            cookie_name: config.cookie_name.clone(),
            increase_expiry: config.renewal_window(),
            allow_unauthenticated: false,
            excluded_paths: Vec::new(),
        }
    }

    pub fn allow_unauthenticated(mut self, allow: bool) -> Self {
        self.allow_unauthenticated = allow;
        self
    }

    pub fn exclude_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Check `path` against exact paths and `prefix*` patterns
pub fn is_excluded_path(path: &str, excluded_paths: &[String]) -> bool {
    excluded_paths.iter().any(|excluded| match excluded.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == excluded,
    })
}

/// Extract a named cookie from request
fn extract_cookie(request: &Request, name: &str) -> Option<String> {
    for cookie_header in request.headers().get_all(header::COOKIE) {
        let Ok(cookie_str) = cookie_header.to_str() else {
            continue;
        };
        for cookie in cookie_str.split(';') {
            if let Some((key, value)) = cookie.trim().split_once('=') {
                if key == name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// Session cookie authentication middleware
pub async fn session_auth(
    State(auth): State<SessionAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_excluded_path(request.uri().path(), &auth.excluded_paths) {
        return Ok(next.run(request).await);
    }

    let user_id = match extract_cookie(&request, &auth.cookie_name) {
        Some(token) => auth
            .store
            .get_user_id(&token, auth.increase_expiry)
            .await
            .map_err(|e| {
                tracing::error!("Session validation failed: {}", e);
                ApiError::internal_error("Session validation failed")
            })?,
        None => None,
    };

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(AuthenticatedUser(user_id));
        }
        None if auth.allow_unauthenticated => {}
        None => return Err(ApiError::unauthorized("Invalid or expired session")),
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Token authentication
// ============================================================================

/// State for `token_auth`
#[derive(Clone)]
pub struct TokenAuth {
    pub provider: Arc<dyn TokenAuthProvider>,
    /// Paths that skip the check. A trailing `*` matches by prefix.
    pub excluded_paths: Vec<String>,
}

impl TokenAuth {
    pub fn new(provider: Arc<dyn TokenAuthProvider>) -> Self {
        Self {
            provider,
            excluded_paths: Vec::new(),
        }
    }

    pub fn exclude_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Extract bearer token from request
fn extract_bearer_token(request: &Request) -> Option<String> {
    let auth_str = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Bearer token authentication middleware
pub async fn token_auth(
    State(auth): State<TokenAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_excluded_path(request.uri().path(), &auth.excluded_paths) {
        return Ok(next.run(request).await);
    }

    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing or malformed Authorization header"))?;

    let user_id = auth.provider.get_user_id(&token).await.map_err(|e| match e {
        TokenAuthError::InternalError(inner) => {
            tracing::error!("Token validation failed: {}", inner);
            ApiError::internal_error("Token validation failed")
        }
        TokenAuthError::NotRecognised | TokenAuthError::AlreadyExists(_) => {
            ApiError::unauthorized("Token not recognised")
        }
    })?;

    request.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(request).await)
}

/// Extract authenticated user from request extensions
pub fn get_authenticated_user(request: &Request) -> Option<i64> {
    request.extensions().get::<AuthenticatedUser>().map(|au| au.0)
}

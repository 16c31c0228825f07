//! Request rate limiting
//!
//! Admission control per client identifier (typically the peer IP address):
//! - a fixed window of `timespan`, shared by every identifier
//! - at most `limit` requests per identifier within the window
//! - identifiers that go over are blocked, either for `block_duration` or
//!   until `clear_blocked` is called
//!
//! State lives in process memory only. Separate processes each enforce
//! their own limit.

use crate::config::RateLimitConfig;
use crate::services::clock::{system_clock, Clock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default number of requests allowed per window
pub const DEFAULT_LIMIT: u64 = 1000;

/// Default window length in seconds
pub const DEFAULT_TIMESPAN_SECONDS: i64 = 300;

/// Returned both for requests that go over the limit and for requests from
/// identifiers that are already blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded")]
pub struct RateLimitExceeded;

#[async_trait]
pub trait RateLimitProvider: Send + Sync {
    /// Count a request from `identifier`, failing if it is over the limit.
    async fn increment(&self, identifier: &str) -> Result<(), RateLimitExceeded>;

    /// Lift every block.
    async fn clear_blocked(&self);
}

struct LimiterState {
    window_start: DateTime<Utc>,
    counts: HashMap<String, u64>,
    blocked: HashMap<String, DateTime<Utc>>,
}

/// Rate limit provider that keeps its counters in memory
pub struct InMemoryLimitProvider {
    timespan: Duration,
    limit: u64,
    block_duration: Option<Duration>,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl InMemoryLimitProvider {
    pub fn new(timespan: Duration, limit: u64, block_duration: Option<Duration>) -> Self {
        Self::with_clock(timespan, limit, block_duration, system_clock())
    }

    pub fn with_clock(
        timespan: Duration,
        limit: u64,
        block_duration: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window_start = clock.now();
        Self {
            timespan,
            limit,
            block_duration,
            clock,
            state: Mutex::new(LimiterState {
                window_start,
                counts: HashMap::new(),
                blocked: HashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.timespan(),
            config.limit,
            config.block_duration(),
        )
    }

    /// Number of identifiers currently blocked
    pub async fn blocked_count(&self) -> usize {
        self.state.lock().await.blocked.len()
    }
}

impl Default for InMemoryLimitProvider {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_TIMESPAN_SECONDS),
            DEFAULT_LIMIT,
            None,
        )
    }
}

#[async_trait]
impl RateLimitProvider for InMemoryLimitProvider {
    async fn increment(&self, identifier: &str) -> Result<(), RateLimitExceeded> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(&blocked_at) = state.blocked.get(identifier) {
            match self.block_duration {
                Some(duration) if now - blocked_at >= duration => {
                    state.blocked.remove(identifier);
                    state.counts.remove(identifier);
                    tracing::debug!("Block on {} has expired", identifier);
                }
                _ => return Err(RateLimitExceeded),
            }
        }

        if now - state.window_start > self.timespan {
            // One window for everyone: any caller past it resets all counts.
            state.window_start = now;
            state.counts.clear();
        }

        let count = state.counts.entry(identifier.to_string()).or_insert(0);
        *count += 1;

        if *count > self.limit {
            state.blocked.insert(identifier.to_string(), now);
            tracing::warn!(
                "Blocking {} after {} requests in the current window",
                identifier,
                self.limit
            );
            return Err(RateLimitExceeded);
        }

        Ok(())
    }

    async fn clear_blocked(&self) {
        let mut state = self.state.lock().await;
        let cleared = state.blocked.len();
        state.blocked.clear();
        tracing::info!("Cleared {} rate limit block(s)", cleared);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Within a single window, exactly `limit` requests pass before the
        /// identifier is blocked.
        #[test]
        fn exactly_limit_requests_pass(limit in 1u64..50, extra in 1u64..10) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let clock = Arc::new(ManualClock::starting_now());
                let limiter = InMemoryLimitProvider::with_clock(
                    Duration::seconds(300),
                    limit,
                    None,
                    clock,
                );

                let mut passed = 0;
                for _ in 0..(limit + extra) {
                    if limiter.increment("A").await.is_ok() {
                        passed += 1;
                    }
                }

                prop_assert_eq!(passed, limit);
                prop_assert_eq!(limiter.blocked_count().await, 1);
                Ok(())
            })?;
        }
    }
}

//! Token-bucket rate limiter.
//!
//! Guards outbound mutating requests. Tokens refill continuously in
//! proportion to elapsed time, so a burst drains the bucket and later
//! requests are admitted at the refill rate instead of in full-capacity
//! spikes at period boundaries.
//!
//! Time comes from `tokio::time`, which makes the limiter deterministic under
//! a paused test clock.
//!
//! # Example
//!
//! ```rust,ignore
//! let limiter = RateLimiter::new("orders", RateLimiterConfig::per_second(5, 5.0));
//! let _permit = limiter.acquire().await?;
//! client.post_order(..).await?;
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Floor on a single wait so a rounding residue cannot produce a zero sleep.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Bucket size (maximum burst).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_second: f64,
    /// Longest an `acquire` call may wait.
    pub acquire_timeout: Duration,
}

impl RateLimiterConfig {
    /// Bucket of `capacity` refilling at `refill_per_second`, default timeout.
    #[must_use]
    pub const fn per_second(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Set the acquire timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(5, 5.0)
    }
}

/// Rate limiter error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// No token became available within the timeout.
    #[error("rate limit timeout after {waited:?}")]
    Timeout {
        /// Time spent waiting before giving up.
        waited: Duration,
    },

    /// The limiter can never admit a request.
    #[error("rate limiter has zero capacity or refill rate")]
    Disabled,
}

/// Admission proof returned by [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePermit {
    /// Time spent waiting for the token.
    pub waited: Duration,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter shared by all callers of one venue endpoint class.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full bucket.
    #[must_use]
    pub fn new(name: &'static str, config: RateLimiterConfig) -> Self {
        Self {
            name,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Limiter name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait cooperatively for a token.
    ///
    /// Fails with [`RateLimitError::Timeout`] if the next token would arrive
    /// after `acquire_timeout`.
    pub async fn acquire(&self) -> Result<RatePermit, RateLimitError> {
        if self.config.capacity == 0 || self.config.refill_per_second <= 0.0 {
            return Err(RateLimitError::Disabled);
        }

        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout;

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                self.refill(&mut bucket, now);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    let waited = now.duration_since(started);
                    if !waited.is_zero() {
                        metrics::histogram!(
                            "oanda_adapter_rate_limit_wait_seconds",
                            "limiter" => self.name
                        )
                        .record(waited.as_secs_f64());
                    }
                    return Ok(RatePermit { waited });
                }

                let missing = 1.0 - bucket.tokens;
                Duration::from_secs_f64(missing / self.config.refill_per_second).max(MIN_WAIT)
            };

            let now = Instant::now();
            if now + wait > deadline {
                let waited = now.duration_since(started);
                tracing::warn!(
                    limiter = self.name,
                    waited_ms = waited.as_millis(),
                    timeout_ms = self.config.acquire_timeout.as_millis(),
                    "Rate limiter timed out waiting for a token"
                );
                return Err(RateLimitError::Timeout { waited });
            }

            tracing::debug!(
                limiter = self.name,
                wait_ms = wait.as_millis(),
                "Rate limited, waiting for token"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token only if one is available now.
    pub fn try_acquire(&self) -> Option<RatePermit> {
        let mut bucket = self.bucket.try_lock().ok()?;
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Some(RatePermit {
                waited: Duration::ZERO,
            })
        } else {
            None
        }
    }

    /// Tokens currently available (refilled to now).
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let added = elapsed.as_secs_f64() * self.config.refill_per_second;
        bucket.tokens = (bucket.tokens + added).min(f64::from(self.config.capacity));
        bucket.last_refill = now;
    }
}

//! Resilience primitives: token-bucket admission control and reconnect backoff.

pub mod backoff;
pub mod rate_limiter;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use rate_limiter::{RateLimitError, RateLimiter, RateLimiterConfig, RatePermit};

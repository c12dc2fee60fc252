//! Reconnection Backoff
//!
//! Exponential backoff with jitter for stream reconnection. The base
//! schedule is deterministic (`initial * multiplier^n`, capped) and
//! monotonically non-decreasing; jitter is applied on top of it within
//! `±jitter_factor` so that many clients do not retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Cap on the base delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the base delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl BackoffConfig {
    /// Same schedule without jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Backoff state across consecutive failures.
///
/// ```rust
/// use oanda_adapter::resilience::{BackoffConfig, BackoffPolicy};
/// use std::time::Duration;
///
/// let mut policy = BackoffPolicy::new(BackoffConfig::default().without_jitter());
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl BackoffPolicy {
    /// Create a policy at its base delay.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Next base delay without jitter, advancing the schedule.
    ///
    /// Returns `None` once `max_attempts` is exhausted.
    pub fn next_base_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.current_delay.min(self.config.max_delay);

        let scaled = (delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            scaled as u128
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        // Never shrink: a multiplier below 1 would otherwise break monotonicity.
        let next = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));
        self.current_delay = next.max(delay);

        Some(delay)
    }

    /// Next delay with jitter applied.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_base_delay().map(|base| self.apply_jitter(base))
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        Duration::from_millis(adjusted_millis as u64)
    }
}

//! Nanosecond-resolution timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer nanoseconds since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixNanos(i64);

/// Error parsing a venue timestamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    /// Not a valid RFC 3339 string.
    #[error("invalid RFC 3339 timestamp '{input}': {reason}")]
    Invalid {
        /// Offending input.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// Outside the range representable as `i64` nanoseconds (years 1677..2262).
    #[error("timestamp '{0}' is outside the nanosecond range")]
    OutOfRange(String),
}

impl UnixNanos {
    /// Wrap a raw nanosecond count.
    #[must_use]
    pub const fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// Parse an RFC 3339 string with sub-second precision.
    ///
    /// The conversion is integer-only. Fractional digits past the ninth are
    /// truncated, never rounded up into the next nanosecond.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimestampError> {
        let parsed = DateTime::parse_from_rfc3339(input).map_err(|e| TimestampError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        parsed
            .with_timezone(&Utc)
            .timestamp_nanos_opt()
            .map(Self)
            .ok_or_else(|| TimestampError::OutOfRange(input.to_string()))
    }

    /// Raw nanosecond count.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Convert back to a `DateTime<Utc>`.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for UnixNanos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.to_datetime()
                .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("2024-01-02T03:04:05.123456789Z", 1_704_164_645_123_456_789 ; "nanosecond precision")]
    #[test_case("2024-01-02T03:04:05.5Z", 1_704_164_645_500_000_000 ; "tenth of a second")]
    #[test_case("2024-01-02T03:04:05Z", 1_704_164_645_000_000_000 ; "whole seconds")]
    #[test_case("2024-01-02T04:04:05.000000001+01:00", 1_704_164_645_000_000_001 ; "offset normalized")]
    fn parses_rfc3339(input: &str, expected: i64) {
        assert_eq!(UnixNanos::parse_rfc3339(input).unwrap().as_i64(), expected);
    }

    #[test]
    fn sub_nanosecond_digits_are_truncated() {
        let ts = UnixNanos::parse_rfc3339("2024-01-02T03:04:05.1234567899Z").unwrap();
        assert_eq!(ts.as_i64(), 1_704_164_645_123_456_789);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            UnixNanos::parse_rfc3339("yesterday"),
            Err(TimestampError::Invalid { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        let ts = UnixNanos::parse_rfc3339("2024-01-02T03:04:05.123456789Z").unwrap();
        assert_eq!(ts.to_string(), "2024-01-02T03:04:05.123456789Z");
    }

    #[test]
    fn ordering_follows_time() {
        let a = UnixNanos::parse_rfc3339("2024-01-02T03:04:05.1Z").unwrap();
        let b = UnixNanos::parse_rfc3339("2024-01-02T03:04:05.2Z").unwrap();
        assert!(a < b);
    }
}

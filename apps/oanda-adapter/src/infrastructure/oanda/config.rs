//! OANDA adapter configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::resilience::RateLimiterConfig;

/// OANDA v20 environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OandaEnvironment {
    /// fxTrade Practice (demo account).
    #[default]
    Practice,
    /// fxTrade (real money).
    Live,
}

impl OandaEnvironment {
    /// Base URL of the REST API.
    #[must_use]
    pub const fn api_base_url(&self) -> &'static str {
        match self {
            Self::Practice => "https://api-fxpractice.oanda.com",
            Self::Live => "https://api-fxtrade.oanda.com",
        }
    }

    /// Base URL of the streaming API.
    #[must_use]
    pub const fn stream_base_url(&self) -> &'static str {
        match self {
            Self::Practice => "https://stream-fxpractice.oanda.com",
            Self::Live => "https://stream-fxtrade.oanda.com",
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for OandaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Practice => write!(f, "PRACTICE"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Unrecognized environment name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown OANDA environment '{0}' (expected 'practice' or 'live')")]
pub struct UnknownEnvironment(pub String);

impl FromStr for OandaEnvironment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" | "demo" => Ok(Self::Practice),
            "live" | "trade" => Ok(Self::Live),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

/// Configuration for the OANDA venue adapter.
#[derive(Clone)]
pub struct OandaConfig {
    /// Personal access token.
    pub access_token: String,
    /// v20 account id (`101-004-1234567-001`).
    pub account_id: String,
    /// Trading environment.
    pub environment: OandaEnvironment,
    /// HTTP request timeout (REST calls; the stream has no overall timeout).
    pub timeout: Duration,
    /// Limiter for read requests (instruments, pending orders, positions).
    pub api_rate: RateLimiterConfig,
    /// Retries for idempotent reads on transient failures.
    pub read_retries: u32,
    api_base_url: String,
    stream_base_url: String,
}

impl OandaConfig {
    /// Create a new configuration against the environment's public hosts.
    #[must_use]
    pub fn new(access_token: String, account_id: String, environment: OandaEnvironment) -> Self {
        Self {
            access_token,
            account_id,
            environment,
            timeout: Duration::from_secs(10),
            api_rate: RateLimiterConfig::per_second(100, 100.0),
            read_retries: 2,
            api_base_url: environment.api_base_url().to_string(),
            stream_base_url: environment.stream_base_url().to_string(),
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the read-request limiter.
    #[must_use]
    pub const fn with_api_rate(mut self, api_rate: RateLimiterConfig) -> Self {
        self.api_rate = api_rate;
        self
    }

    /// Set how many times a failed read is retried.
    #[must_use]
    pub const fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// Point both APIs at other hosts (local mock servers).
    #[must_use]
    pub fn with_base_urls(mut self, api: impl Into<String>, stream: impl Into<String>) -> Self {
        self.api_base_url = api.into();
        self.stream_base_url = stream.into();
        self
    }

    /// REST API base URL in effect.
    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Streaming API base URL in effect.
    #[must_use]
    pub fn stream_base_url(&self) -> &str {
        &self.stream_base_url
    }
}

impl fmt::Debug for OandaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OandaConfig")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .field("api_rate", &self.api_rate)
            .field("read_retries", &self.read_retries)
            .field("api_base_url", &self.api_base_url)
            .field("stream_base_url", &self.stream_base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn config(env: OandaEnvironment) -> OandaConfig {
        OandaConfig::new("token".to_string(), "101-001-1-001".to_string(), env)
    }

    #[test]
    fn practice_environment_urls() {
        let env = OandaEnvironment::Practice;
        assert!(env.api_base_url().contains("fxpractice"));
        assert!(env.stream_base_url().starts_with("https://stream-"));
        assert!(!env.is_live());
    }

    #[test]
    fn live_environment_urls() {
        let env = OandaEnvironment::Live;
        assert_eq!(env.api_base_url(), "https://api-fxtrade.oanda.com");
        assert_eq!(env.stream_base_url(), "https://stream-fxtrade.oanda.com");
        assert!(env.is_live());
    }

    #[test_case("practice", OandaEnvironment::Practice)]
    #[test_case("PRACTICE", OandaEnvironment::Practice)]
    #[test_case(" live ", OandaEnvironment::Live)]
    fn environment_parses(input: &str, expected: OandaEnvironment) {
        assert_eq!(input.parse::<OandaEnvironment>(), Ok(expected));
    }

    #[test]
    fn environment_rejects_unknown() {
        assert!("paper".parse::<OandaEnvironment>().is_err());
    }

    #[test]
    fn environment_display() {
        assert_eq!(OandaEnvironment::Practice.to_string(), "PRACTICE");
        assert_eq!(OandaEnvironment::Live.to_string(), "LIVE");
    }

    #[test]
    fn config_defaults_follow_environment() {
        let config = config(OandaEnvironment::Live);
        assert_eq!(config.api_base_url(), "https://api-fxtrade.oanda.com");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.api_rate.capacity, 100);
    }

    #[test]
    fn config_builders() {
        let config = config(OandaEnvironment::Practice)
            .with_timeout(Duration::from_secs(3))
            .with_read_retries(0)
            .with_base_urls("http://127.0.0.1:1", "http://127.0.0.1:2");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.read_retries, 0);
        assert_eq!(config.api_base_url(), "http://127.0.0.1:1");
        assert_eq!(config.stream_base_url(), "http://127.0.0.1:2");
    }

    #[test]
    fn debug_redacts_token() {
        let config = OandaConfig::new(
            "super-secret".to_string(),
            "acct".to_string(),
            OandaEnvironment::Practice,
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}

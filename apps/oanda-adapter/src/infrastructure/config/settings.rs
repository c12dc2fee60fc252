//! Adapter Configuration Settings
//!
//! Configuration types for the OANDA adapter, loaded from environment
//! variables. Every variable except the credentials has a default.

use std::path::Path;
use std::time::Duration;

use crate::application::ports::InstrumentMetadata;
use crate::application::services::{SessionConfig, StreamingConfig};
use crate::domain::shared::InstrumentId;
use crate::infrastructure::bus::DEFAULT_BUS_CAPACITY;
use crate::infrastructure::oanda::symbology::from_oanda;
use crate::infrastructure::oanda::{OandaConfig, OandaEnvironment};
use crate::resilience::{BackoffConfig, RateLimiterConfig};

/// OANDA API credentials.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
    account_id: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(access_token: String, account_id: String) -> Self {
        Self {
            access_token,
            account_id,
        }
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Get the account id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Longest wait for the pricing stream to open.
    pub handshake_timeout: Duration,
    /// Longest silence before the stream is dropped (OANDA heartbeats every 5s).
    pub stall_timeout: Duration,
    /// Reconnect schedule.
    pub reconnect: BackoffConfig,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(20),
            reconnect: BackoffConfig::default(),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
    /// Event bus capacity.
    pub bus_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8083,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// Complete adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Trading environment.
    pub environment: OandaEnvironment,
    /// Instruments to load and stream.
    pub instruments: Vec<InstrumentId>,
    /// Limiter for order submission and cancellation.
    pub order_rate: RateLimiterConfig,
    /// Limiter for read requests.
    pub api_rate: RateLimiterConfig,
    /// REST request timeout.
    pub http_timeout: Duration,
    /// Stream settings.
    pub stream: StreamSettings,
    /// Instrument definitions used instead of querying OANDA.
    pub static_instruments: Option<Vec<InstrumentMetadata>>,
    /// Server settings.
    pub server: ServerSettings,
}

impl AdapterConfig {
    /// Create configuration from environment variables.
    ///
    /// Loads a `.env` file from the current directory or an ancestor first.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let access_token = env.required("OANDA_ACCESS_TOKEN")?;
        let account_id = env.required("OANDA_ACCOUNT_ID")?;

        let environment = match env.get("OANDA_ENVIRONMENT") {
            Some(value) => value
                .parse()
                .map_err(|e: crate::infrastructure::oanda::UnknownEnvironment| {
                    ConfigError::InvalidValue {
                        key: "OANDA_ENVIRONMENT".to_string(),
                        reason: e.to_string(),
                    }
                })?,
            None => OandaEnvironment::default(),
        };

        let instruments = env
            .get("OANDA_INSTRUMENTS")
            .map_or_else(|| vec![from_oanda("EUR_USD")], |list| parse_instruments(&list));
        if instruments.is_empty() {
            return Err(ConfigError::EmptyValue("OANDA_INSTRUMENTS".to_string()));
        }

        let order_rate = RateLimiterConfig::per_second(
            env.parse("OANDA_ORDER_RATE_CAPACITY", 5)?,
            env.parse("OANDA_ORDER_RATE_PER_SEC", 5.0)?,
        )
        .with_timeout(Duration::from_millis(
            env.parse("OANDA_ORDER_RATE_TIMEOUT_MS", 5_000)?,
        ));

        let api_rate = RateLimiterConfig::per_second(
            env.parse("OANDA_API_RATE_CAPACITY", 100)?,
            env.parse("OANDA_API_RATE_PER_SEC", 100.0)?,
        );

        let defaults = BackoffConfig::default();
        let stream = StreamSettings {
            handshake_timeout: Duration::from_secs(env.parse("OANDA_HANDSHAKE_TIMEOUT_SECS", 10)?),
            stall_timeout: Duration::from_secs(env.parse("OANDA_STALL_TIMEOUT_SECS", 20)?),
            reconnect: BackoffConfig {
                initial_delay: Duration::from_millis(
                    env.parse("OANDA_RECONNECT_INITIAL_MS", 1_000)?,
                ),
                max_delay: Duration::from_secs(env.parse("OANDA_RECONNECT_MAX_SECS", 30)?),
                multiplier: env.parse("OANDA_RECONNECT_MULTIPLIER", defaults.multiplier)?,
                jitter_factor: env.parse("OANDA_RECONNECT_JITTER", defaults.jitter_factor)?,
                max_attempts: env.parse("OANDA_RECONNECT_MAX_ATTEMPTS", defaults.max_attempts)?,
            },
        };
        if !(0.0..1.0).contains(&stream.reconnect.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                key: "OANDA_RECONNECT_JITTER".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }

        let static_instruments = env
            .get("OANDA_STATIC_INSTRUMENTS")
            .map(|path| load_static_instruments(Path::new(&path)))
            .transpose()?;

        let server = ServerSettings {
            health_port: env.parse("HEALTH_PORT", ServerSettings::default().health_port)?,
            bus_capacity: env.parse("BUS_CAPACITY", DEFAULT_BUS_CAPACITY)?,
        };

        Ok(Self {
            credentials: Credentials::new(access_token, account_id),
            environment,
            instruments,
            order_rate,
            api_rate,
            http_timeout: Duration::from_secs(env.parse("OANDA_HTTP_TIMEOUT_SECS", 10)?),
            stream,
            static_instruments,
            server,
        })
    }

    /// Configuration for the OANDA HTTP adapter.
    #[must_use]
    pub fn oanda_config(&self) -> OandaConfig {
        OandaConfig::new(
            self.credentials.access_token().to_string(),
            self.credentials.account_id().to_string(),
            self.environment,
        )
        .with_timeout(self.http_timeout)
        .with_api_rate(self.api_rate.clone())
    }

    /// Configuration for the venue session.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            venue: "oanda".to_string(),
            streaming: StreamingConfig {
                instruments: self.instruments.clone(),
                handshake_timeout: self.stream.handshake_timeout,
                stall_timeout: self.stream.stall_timeout,
                backoff: self.stream.reconnect.clone(),
            },
            order_rate: self.order_rate.clone(),
            live: self.environment.is_live(),
            static_instruments: self.static_instruments.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },

    /// Static instrument file could not be read or parsed.
    #[error("static instruments {path}: {reason}")]
    StaticInstruments {
        /// File path.
        path: String,
        /// What went wrong.
        reason: String,
    },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |value| {
            value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{value}': {e}"),
            })
        })
    }
}

/// Accepts OANDA (`EUR_USD`) or venue-neutral (`EUR/USD`) names.
fn parse_instruments(list: &str) -> Vec<InstrumentId> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| from_oanda(&name.to_ascii_uppercase()))
        .collect()
}

fn load_static_instruments(path: &Path) -> Result<Vec<InstrumentMetadata>, ConfigError> {
    let error = |reason: String| ConfigError::StaticInstruments {
        path: path.display().to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| error(e.to_string()))
}

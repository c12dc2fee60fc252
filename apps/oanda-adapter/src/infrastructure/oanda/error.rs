//! OANDA-specific error types.

use thiserror::Error;

use crate::application::ports::VenueError;
use crate::resilience::RateLimitError;

/// Errors from the OANDA adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OandaError {
    /// HTTP request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Network error (connection refused, reset, DNS).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// Server-side failure (408 or 5xx).
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// API returned a client error with no more specific meaning.
    #[error("API error: {code} - {message}")]
    Api {
        /// `errorCode` from the body, or the HTTP status.
        code: String,
        /// `errorMessage` from the body.
        message: String,
    },

    /// Order request refused (`orderRejectTransaction`).
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Token refused or lacks access to the account.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limited by OANDA.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Local read limiter gave up.
    #[error("Local rate limit: {0}")]
    LocalRateLimit(RateLimitError),

    /// Order or other resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body did not match the expected shape.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Pricing stream transport failure.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for OandaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::Http(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<OandaError> for VenueError {
    fn from(err: OandaError) -> Self {
        match err {
            OandaError::Http(message)
            | OandaError::Network(message)
            | OandaError::Stream(message) => Self::Transport { message },
            OandaError::Timeout => Self::transport("request timed out"),
            OandaError::Server { status, message } => Self::Transport {
                message: format!("{status}: {message}"),
            },
            OandaError::Api { code, message } => Self::Rejected {
                reason: format!("{code}: {message}"),
            },
            OandaError::OrderRejected(reason) => Self::Rejected { reason },
            OandaError::AuthenticationFailed(message) => Self::Authentication { message },
            OandaError::RateLimited { .. } | OandaError::LocalRateLimit(_) => Self::RateLimited,
            OandaError::NotFound(id) => Self::NotFound { id },
            OandaError::JsonParse(message) => Self::Protocol { message },
        }
    }
}

//! HTTP client wrapper for the v20 REST and streaming endpoints.
//!
//! Reads are idempotent: they pass through the read limiter and are retried
//! on transport failures, 5xx and 429. Writes (`POST`, `PUT`) go out exactly
//! once; whether to try again is the execution client's decision, since a
//! write that timed out may still have reached the venue.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::OandaErrorResponse;
use super::config::OandaConfig;
use super::error::OandaError;
use crate::resilience::{BackoffConfig, BackoffPolicy, RateLimiter};

const DATETIME_FORMAT_HEADER: &str = "Accept-Datetime-Format";

/// HTTP client for the OANDA v20 API.
#[derive(Debug)]
pub struct OandaHttpClient {
    client: Client,
    stream_client: Client,
    access_token: String,
    api_base_url: String,
    stream_base_url: String,
    account_path: String,
    read_limiter: RateLimiter,
    read_retry: BackoffConfig,
}

impl OandaHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &OandaConfig) -> Result<Self, OandaError> {
        if config.access_token.is_empty() {
            return Err(OandaError::AuthenticationFailed(
                "access token is empty".to_string(),
            ));
        }
        if config.account_id.is_empty() {
            return Err(OandaError::Http("account id is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OandaError::Http(e.to_string()))?;

        // The stream stays open indefinitely; only the connect phase is bounded.
        let stream_client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| OandaError::Http(e.to_string()))?;

        Ok(Self {
            client,
            stream_client,
            access_token: config.access_token.clone(),
            api_base_url: config.api_base_url().trim_end_matches('/').to_string(),
            stream_base_url: config.stream_base_url().trim_end_matches('/').to_string(),
            account_path: format!("/v3/accounts/{}", config.account_id),
            read_limiter: RateLimiter::new("api", config.api_rate.clone()),
            read_retry: BackoffConfig {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(2),
                multiplier: 2.0,
                jitter_factor: 0.1,
                max_attempts: config.read_retries,
            },
        })
    }

    /// `/v3/accounts/{id}` followed by `suffix`.
    #[must_use]
    pub fn account_path(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.account_path)
    }

    /// GET against the REST API, rate limited and retried.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, OandaError> {
        let url = format!("{}{path}", self.api_base_url);
        let mut backoff = BackoffPolicy::new(self.read_retry.clone());

        loop {
            self.read_limiter
                .acquire()
                .await
                .map_err(OandaError::LocalRateLimit)?;

            let request = self.authorized(self.client.get(&url)).query(query);
            let err = match self.send(request, path).await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) => err,
                Err(err) => return Err(err),
            };

            let delay = match &err {
                OandaError::RateLimited { retry_after_secs } if *retry_after_secs > 0 => {
                    backoff
                        .next_delay()
                        .map(|_| Duration::from_secs(*retry_after_secs))
                }
                _ => backoff.next_delay(),
            };
            let Some(delay) = delay else {
                return Err(err);
            };

            tracing::warn!(
                path,
                error = %err,
                delay_ms = delay.as_millis(),
                attempt = backoff.attempt_count(),
                "Read request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// POST against the REST API. Sent once.
    #[allow(clippy::future_not_send)]
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, OandaError> {
        let url = format!("{}{path}", self.api_base_url);
        let request = self.authorized(self.client.post(&url)).json(body);
        self.send(request, path).await
    }

    /// PUT without a body against the REST API. Sent once.
    pub async fn put<T: DeserializeOwned>(&self, path: &str) -> Result<T, OandaError> {
        let url = format!("{}{path}", self.api_base_url);
        let request = self.authorized(self.client.put(&url));
        self.send(request, path).await
    }

    /// Open a streaming GET against the streaming API.
    ///
    /// Resolves once the response headers arrive with a success status.
    pub async fn open_stream(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, OandaError> {
        let url = format!("{}{path}", self.stream_base_url);
        let request = self.authorized(self.stream_client.get(&url)).query(query);
        let response = request.send().await?;
        check_status(response, path).await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .header(DATETIME_FORMAT_HEADER, "RFC3339")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<T, OandaError> {
        let response = request.send().await?;
        let response = check_status(response, path).await?;

        let text = response.text().await?;
        tracing::debug!(path, bytes = text.len(), "OANDA response");
        if text.is_empty() {
            return serde_json::from_str("null").map_err(|e| OandaError::JsonParse(e.to_string()));
        }
        serde_json::from_str(&text).map_err(|e| OandaError::JsonParse(e.to_string()))
    }
}

/// Pass a successful response through; turn anything else into an error.
async fn check_status(response: Response, path: &str) -> Result<Response, OandaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let error_body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<OandaErrorResponse>(&error_body).unwrap_or_default();
    let message = parsed
        .error_message
        .clone()
        .unwrap_or_else(|| error_body.clone());

    Err(match categorize_status(status) {
        ErrorCategory::RateLimited => OandaError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(0),
        },
        ErrorCategory::Retryable => OandaError::Server {
            status: status.as_u16(),
            message,
        },
        ErrorCategory::NonRetryable => match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                OandaError::AuthenticationFailed(message)
            }
            StatusCode::NOT_FOUND => OandaError::NotFound(path.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                match parsed.reject_reason() {
                    Some(reason) => OandaError::OrderRejected(reason),
                    None => OandaError::Api {
                        code: status.as_u16().to_string(),
                        message,
                    },
                }
            }
            _ => OandaError::Api {
                code: parsed
                    .error_code
                    .unwrap_or_else(|| status.as_u16().to_string()),
                message,
            },
        },
    })
}

const fn is_retryable(err: &OandaError) -> bool {
    matches!(
        err,
        OandaError::Network(_)
            | OandaError::Timeout
            | OandaError::Server { .. }
            | OandaError::RateLimited { .. }
    )
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

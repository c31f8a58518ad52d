//! Shared HTTP plumbing: one client per adapter, retry with exponential
//! backoff, and status classification into the engine's error taxonomy.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempt budget per request (initial try included).
pub const MAX_RETRY_ATTEMPTS: usize = 3;

/// First backoff step; doubles per attempt: 500, 1000, 2000 ms.
pub const RETRY_BASE_BACKOFF_MS: u64 = 500;

const APP_USER_AGENT: &str = concat!("aifd/", env!("CARGO_PKG_VERSION"));

/// Statuses worth retrying before giving up.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// Sub-100ms jitter derived from the wall clock, spreading concurrent
/// retries without a dedicated RNG.
fn jitter_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % 100)
        .unwrap_or(0)
}

/// Thin wrapper over [`reqwest::Client`] applying the engine's retry and
/// timeout policy uniformly across adapters.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Client with the default timeout and no extra headers.
    pub fn new() -> Result<Self> {
        Self::with_headers(HeaderMap::new())
    }

    /// Client with default headers (e.g. an auth token) applied to every
    /// request.
    pub fn with_headers(headers: HeaderMap) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .build()
            .map_err(Error::Http)?;
        Ok(Self { client })
    }

    /// GET `url`, retrying transient failures with exponential backoff.
    ///
    /// Transport errors (timeout, connect) and the retryable status set are
    /// retried up to [`MAX_RETRY_ATTEMPTS`] times; any final response is
    /// returned as-is for the caller to classify. Non-retryable statuses
    /// return immediately.
    pub async fn get_with_retry(&self, url: &str) -> Result<Response> {
        let mut backoff_ms = RETRY_BASE_BACKOFF_MS;

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) && attempt < MAX_RETRY_ATTEMPTS {
                        debug!(
                            "HTTP {status} for {url}; retry {}/{MAX_RETRY_ATTEMPTS} after {backoff_ms}ms",
                            attempt + 1
                        );
                        sleep(Duration::from_millis(backoff_ms + jitter_ms())).await;
                        backoff_ms *= 2;
                        continue;
                    }
                    return Ok(response);
                },
                Err(source) => {
                    let retryable =
                        source.is_timeout() || source.is_connect() || source.is_request();
                    if retryable && attempt < MAX_RETRY_ATTEMPTS {
                        debug!(
                            "network error for {url}; retry {}/{MAX_RETRY_ATTEMPTS} after {backoff_ms}ms: {source}",
                            attempt + 1
                        );
                        sleep(Duration::from_millis(backoff_ms + jitter_ms())).await;
                        backoff_ms *= 2;
                        continue;
                    }
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        source,
                    });
                },
            }
        }

        Err(Error::Other("retry loop exhausted without a result".to_string()))
    }
}

/// Map a non-success status to the taxonomy: 401/403 are auth, 429 is rate
/// limiting, 404 is not-found; everything else keeps its status for later
/// classification.
pub fn status_error(url: &str, status: StatusCode) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth {
            url: url.to_string(),
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit {
            url: url.to_string(),
            status: status.as_u16(),
        },
        _ => Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        },
    }
}

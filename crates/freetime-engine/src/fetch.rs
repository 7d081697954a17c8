//! Fetching raw calendar payloads.
//!
//! The engine only needs "identifier in, text out"; [`FeedFetcher`] is the seam where
//! transports plug in. [`HttpFeedFetcher`] covers public `http(s)://` and `webcal://`
//! feed URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;

/// Default per-request timeout for the HTTP client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of raw calendar payloads.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the raw payload for one source identifier.
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: FeedFetcher + ?Sized> FeedFetcher for std::sync::Arc<T> {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        (**self).fetch(identifier).await
    }
}

/// Plain HTTP GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("freetime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Use a preconfigured client; `timeout` is only used to report timeouts.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        let url = normalize_url(identifier)?;
        debug!(%url, "fetching calendar feed");

        let response = self.client.get(&url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                FetchError::Request(err.to_string())
            }
        })?;

        let status = response.status();
        debug!(%url, %status, "received calendar feed response");
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyPayload);
        }
        Ok(body)
    }
}

/// Accept `http(s)://` as is and rewrite `webcal(s)://` to `https://`.
pub fn normalize_url(identifier: &str) -> Result<String, FetchError> {
    let trimmed = identifier.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(trimmed.to_string());
    }
    for scheme in ["webcals://", "webcal://"] {
        if lower.starts_with(scheme) {
            return Ok(format!("https://{}", &trimmed[scheme.len()..]));
        }
    }
    Err(FetchError::InvalidIdentifier(identifier.to_string()))
}

//! Source identifiers as typed on the command line: feed URLs or local `.ics` files.

use std::path::Path;

use async_trait::async_trait;
use freetime_engine::error::FetchError;
use freetime_engine::fetch::{FeedFetcher, HttpFeedFetcher};
use tracing::debug;

/// Routes URLs to the HTTP fetcher and everything else to the filesystem.
pub struct CliFetcher {
    http: HttpFeedFetcher,
}

impl CliFetcher {
    pub fn new(http: HttpFeedFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedFetcher for CliFetcher {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        if identifier.contains("://") && !identifier.starts_with("file://") {
            return self.http.fetch(identifier).await;
        }

        let path = Path::new(identifier.strip_prefix("file://").unwrap_or(identifier));
        debug!(path = %path.display(), "reading local calendar file");
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Request(format!("{}: {e}", path.display())))?;
        if text.trim().is_empty() {
            return Err(FetchError::EmptyPayload);
        }
        Ok(text)
    }
}

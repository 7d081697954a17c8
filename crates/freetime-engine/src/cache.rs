//! Keyed, time-bounded payload cache in front of any [`FeedFetcher`].
//!
//! Caching sits outside the pipeline: the parser, merger, deriver and intersector stay
//! pure functions of their inputs, and only the fetch step consults the cache.
//! Only successful payloads are cached; failures always go back to the transport.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::error::FetchError;
use crate::fetch::FeedFetcher;

/// Default max number of cached payloads.
pub const DEFAULT_CACHE_CAPACITY: u64 = 64;

pub struct CachedFetcher<F> {
    inner: F,
    cache: Cache<String, String>,
}

impl<F: FeedFetcher> CachedFetcher<F> {
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: F, ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Drop every cached payload.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl<F: FeedFetcher> FeedFetcher for CachedFetcher<F> {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        if let Some(payload) = self.cache.get(identifier).await {
            debug!(source = %identifier, "calendar payload served from cache");
            return Ok(payload);
        }
        let payload = self.inner.fetch(identifier).await?;
        self.cache
            .insert(identifier.to_string(), payload.clone())
            .await;
        Ok(payload)
    }
}

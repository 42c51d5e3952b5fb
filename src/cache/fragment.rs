//! Nested segment cache for renderers.
//!
//! A fragment is stored in the same metadata-aware store as full pages. Every
//! fragment read or write is reported to the request's [`SegmentCollector`], so
//! the page that embeds it inherits its tags and lifetime.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::aggregator::SegmentCollector;
use super::error::StoreError;
use super::keys::CacheKey;
use super::store::EntryStore;
use super::tags::sanitize_tags;

const FRAGMENT_PREFIX: &str = "fragment:";

#[derive(Clone)]
pub struct FragmentCache {
    store: Arc<EntryStore>,
}

impl FragmentCache {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    /// Serve `name` from the store or render and store it.
    ///
    /// Backend failures fall back to rendering. Only corrupted entries in the
    /// development context surface as errors.
    pub async fn render_cached<T, S, F, Fut, E>(
        &self,
        collector: &SegmentCollector,
        name: &str,
        tags: T,
        lifetime: Option<u64>,
        render: F,
    ) -> Result<String, E>
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: From<StoreError>,
    {
        let key = CacheKey::from_identifier(format!("{FRAGMENT_PREFIX}{name}"));
        let now = self.store.clock().now();

        match self.store.get(&key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                if let Some(metadata) = &entry.metadata {
                    debug!(fragment = name, outcome = "hit", "Fragment served from cache");
                    collector.record_entry(metadata);
                    return Ok(String::from_utf8_lossy(&entry.payload).into_owned());
                }
                debug!(fragment = name, "Fragment entry without metadata, re-rendering");
            }
            Ok(_) => {}
            Err(err) if err.is_corruption() => return Err(err.into()),
            Err(err) => warn!(fragment = name, error = %err, "Fragment lookup failed"),
        }

        let tags: Vec<String> = sanitize_tags(tags).into_iter().collect();
        let body = render().await?;

        if lifetime == Some(0) {
            collector.segment_cached(tags, lifetime);
            return Ok(body);
        }

        match self.store.set(&key, body.as_bytes(), &tags, lifetime).await {
            Ok(metadata) => collector.record_entry(&metadata),
            Err(err) => {
                warn!(fragment = name, error = %err, "Fragment store failed");
                collector.segment_cached(tags, lifetime);
            }
        }
        debug!(fragment = name, outcome = "miss", "Fragment rendered");
        Ok(body)
    }

    /// Render a segment that must never be cached and mark the page accordingly.
    pub async fn uncached<F, Fut, E>(collector: &SegmentCollector, render: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        collector.segment_uncacheable();
        render().await
    }
}

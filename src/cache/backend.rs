//! Pluggable storage backends.
//!
//! The store layer treats a backend as a tag-aware key/value map over opaque
//! bytes. [`MemoryBackend`] keeps entries in process memory with LRU eviction.

use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::config::CacheConfig;
use super::error::BackendError;
use super::index::TagIndex;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::backend";
pub const METRIC_EVICT_TOTAL: &str = "pagecache_evict_total";

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Overwrite `key`. `lifetime` is a hint; backends without TTL support may ignore it.
    async fn set(
        &self,
        key: &str,
        value: Bytes,
        tags: &[String],
        lifetime: Option<u64>,
    ) -> Result<(), BackendError>;

    /// Evict every entry tagged with any of `tags`; returns the number evicted.
    async fn flush_by_tags(&self, tags: &[String]) -> Result<usize, BackendError>;

    /// Evict everything.
    async fn flush(&self) -> Result<(), BackendError>;
}

struct MemoryInner {
    entries: LruCache<String, Bytes>,
    index: TagIndex,
}

/// In-process backend.
///
/// Payloads and the tag index share one lock, so a finished flush never
/// leaves an indexed-but-missing or readable-but-unindexed entry behind.
pub struct MemoryBackend {
    inner: RwLock<MemoryInner>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                entries: LruCache::new(config.capacity_non_zero()),
                index: TagIndex::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag_count(&self) -> usize {
        rw_read(&self.inner, SOURCE, "tag_count").index.tag_count()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        Ok(rw_write(&self.inner, SOURCE, "get")
            .entries
            .get(key)
            .cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        tags: &[String],
        _lifetime: Option<u64>,
    ) -> Result<(), BackendError> {
        let mut inner = rw_write(&self.inner, SOURCE, "set");
        if let Some((evicted, _)) = inner.entries.push(key.to_string(), value)
            && evicted != key
        {
            inner.index.unregister(&evicted);
            counter!(METRIC_EVICT_TOTAL).increment(1);
        }
        inner.index.register(key, tags);
        Ok(())
    }

    async fn flush_by_tags(&self, tags: &[String]) -> Result<usize, BackendError> {
        if tags.is_empty() {
            return Ok(0);
        }
        let mut inner = rw_write(&self.inner, SOURCE, "flush_by_tags");
        let keys = inner.index.keys_for_tags(tags);
        let mut flushed = 0;
        for key in keys {
            inner.index.unregister(&key);
            if inner.entries.pop(&key).is_some() {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    async fn flush(&self) -> Result<(), BackendError> {
        let mut inner = rw_write(&self.inner, SOURCE, "flush");
        inner.entries.clear();
        inner.index.clear();
        Ok(())
    }
}

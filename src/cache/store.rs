//! Metadata-aware entry store.
//!
//! Wraps a [`CacheBackend`] and frames every payload with its identifier,
//! tags, lifetime and storage time. Callers sanitize tags before writing.

use std::sync::Arc;

use tracing::{debug, error};

use super::backend::CacheBackend;
use super::clock::Clock;
use super::config::ExecutionContext;
use super::entry::{CacheEntry, EntryMetadata, decode_envelope, encode_envelope};
use super::error::StoreError;
use super::keys::CacheKey;

pub struct EntryStore {
    backend: Arc<dyn CacheBackend>,
    context: ExecutionContext,
    clock: Arc<dyn Clock>,
}

impl EntryStore {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        context: ExecutionContext,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            context,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Look up one entry. A missing key is `Ok(None)`.
    ///
    /// An entry without a readable envelope is an error in development. In
    /// production it is logged and returned with `metadata: None`.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let Some(raw) = self.backend.get(key.as_str()).await? else {
            return Ok(None);
        };

        match decode_envelope(key.as_str(), &raw) {
            Ok((metadata, payload)) => Ok(Some(CacheEntry {
                identifier: key.clone(),
                payload,
                metadata: Some(metadata),
            })),
            Err(err) if self.context.is_production() => {
                error!(
                    identifier = %key,
                    error = %err,
                    "Cache entry without readable metadata, serving as plain payload"
                );
                Ok(Some(CacheEntry {
                    identifier: key.clone(),
                    payload: raw,
                    metadata: None,
                }))
            }
            Err(err) => Err(err),
        }
    }

    /// Write `payload` under `key`, replacing any previous entry.
    pub async fn set(
        &self,
        key: &CacheKey,
        payload: &[u8],
        tags: &[String],
        lifetime: Option<u64>,
    ) -> Result<EntryMetadata, StoreError> {
        let metadata = EntryMetadata {
            identifier: key.as_str().to_string(),
            tags: tags.to_vec(),
            lifetime,
            stored_at: self.clock.now().unix_timestamp(),
        };
        let raw = encode_envelope(&metadata, payload)?;
        self.backend
            .set(key.as_str(), raw, &metadata.tags, lifetime)
            .await?;
        debug!(identifier = %key, tags = metadata.tags.len(), ?lifetime, "Cache entry stored");
        Ok(metadata)
    }

    /// Evict all entries carrying any of the already-sanitized `tags`.
    pub async fn flush_by_tags(&self, tags: &[String]) -> Result<usize, StoreError> {
        if tags.is_empty() {
            return Ok(0);
        }
        Ok(self.backend.flush_by_tags(tags).await?)
    }

    pub async fn flush_all(&self) -> Result<(), StoreError> {
        Ok(self.backend.flush().await?)
    }

    /// Write raw bytes, bypassing the envelope.
    #[cfg(test)]
    pub(crate) async fn set_raw(&self, key: &CacheKey, raw: bytes::Bytes) -> Result<(), StoreError> {
        Ok(self.backend.set(key.as_str(), raw, &[], None).await?)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::cache::clock::ManualClock;
    use crate::cache::config::CacheConfig;

    fn store(context: ExecutionContext) -> (EntryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::from_unix_timestamp(1_000_000).expect("timestamp"),
        ));
        let backend = Arc::new(MemoryBackend::new(&CacheConfig::default()));
        (EntryStore::new(backend, context, clock.clone()), clock)
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn roundtrip_preserves_payload_and_metadata() {
        let (store, clock) = store(ExecutionContext::Production);
        let key = CacheKey::from_identifier("page");

        let written = store
            .set(&key, b"<html>hi</html>", &tags(&["doc-1"]), Some(60))
            .await
            .expect("set");
        assert_eq!(written.stored_at, clock.now().unix_timestamp());

        let entry = store.get(&key).await.expect("get").expect("present");
        assert_eq!(entry.payload, Bytes::from_static(b"<html>hi</html>"));
        assert_eq!(entry.metadata, Some(written));
        assert_eq!(entry.tags(), ["doc-1".to_string()]);
        assert_eq!(entry.lifetime(), Some(60));
    }

    #[tokio::test]
    async fn missing_key_is_absent_not_error() {
        let (store, _) = store(ExecutionContext::Development);
        let result = store.get(&CacheKey::from_identifier("nope")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn age_follows_the_clock() {
        let (store, clock) = store(ExecutionContext::Production);
        let key = CacheKey::from_identifier("page");
        store.set(&key, b"x", &tags(&["t"]), Some(60)).await.expect("set");

        clock.advance(Duration::seconds(30));
        let entry = store.get(&key).await.expect("get").expect("present");
        assert_eq!(entry.age(clock.now()), Some(30));
    }

    #[tokio::test]
    async fn corrupt_entry_fails_loud_in_development() {
        let (store, _) = store(ExecutionContext::Development);
        let key = CacheKey::from_identifier("corrupt");
        store
            .set_raw(&key, Bytes::from_static(b"no envelope here"))
            .await
            .expect("raw set");

        let err = store.get(&key).await.expect_err("corruption surfaces");
        assert!(err.is_corruption());
    }

    #[tokio::test]
    async fn corrupt_entry_degrades_in_production() {
        let (store, _) = store(ExecutionContext::Production);
        let key = CacheKey::from_identifier("corrupt");
        store
            .set_raw(&key, Bytes::from_static(b"no envelope here"))
            .await
            .expect("raw set");

        let entry = store.get(&key).await.expect("degraded").expect("present");
        assert!(entry.metadata.is_none());
        assert_eq!(entry.payload, Bytes::from_static(b"no envelope here"));
        assert!(entry.tags().is_empty());
    }

    #[tokio::test]
    async fn flush_by_tags_evicts_intersecting_entries() {
        let (store, _) = store(ExecutionContext::Production);
        let a = CacheKey::from_identifier("a");
        let b = CacheKey::from_identifier("b");
        store.set(&a, b"a", &tags(&["x", "y"]), None).await.expect("set");
        store.set(&b, b"b", &tags(&["z"]), None).await.expect("set");

        assert_eq!(store.flush_by_tags(&tags(&["y", "q"])).await.expect("flush"), 1);
        assert!(store.get(&a).await.expect("get").is_none());
        assert!(store.get(&b).await.expect("get").is_some());
        assert_eq!(store.flush_by_tags(&[]).await.expect("flush"), 0);
    }
}

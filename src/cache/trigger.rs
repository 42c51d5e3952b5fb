//! Invalidation trigger.
//!
//! Entry point for content changes. In deferred mode changes queue up until
//! [`InvalidationTrigger::commit`] or the background flush runs; in immediate
//! mode each change is flushed before the call returns.

use std::sync::Arc;

use tracing::{debug, info};

use super::config::{CacheConfig, FlushMode};
use super::error::StoreError;
use super::events::{ChangeKind, ContentChange};
use super::flusher::CacheFlusher;
use super::tags::sanitize_tags;

pub struct InvalidationTrigger {
    config: CacheConfig,
    flusher: Arc<CacheFlusher>,
}

impl InvalidationTrigger {
    pub fn new(config: CacheConfig, flusher: Arc<CacheFlusher>) -> Self {
        Self { config, flusher }
    }

    /// Record that a content unit changed.
    pub async fn content_changed(&self, identifier: &str, type_name: &str, kind: ChangeKind) {
        if !self.config.enabled {
            debug!(identifier, type_name, %kind, "Invalidation skipped: cache disabled");
            return;
        }

        self.flusher
            .queue()
            .publish(ContentChange::new(identifier, type_name, kind));

        if self.config.flush_mode == FlushMode::Immediate {
            self.flusher.flush_pending().await;
        }
    }

    /// End of a unit of work: flush everything queued so far.
    pub async fn commit(&self) -> usize {
        self.flusher.flush_pending().await
    }

    /// Flush arbitrary raw tags, sanitizing them first.
    pub async fn flush_tags<I, S>(&self, tags: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = sanitize_tags(tags).into_iter().collect();
        let evicted = self.flusher.store().flush_by_tags(&tags).await?;
        info!(tags = ?tags, evicted, "Flushed cache by tags");
        Ok(evicted)
    }

    pub async fn flush_all(&self) -> Result<(), StoreError> {
        self.flusher.store().flush_all().await?;
        info!("Flushed entire page cache");
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.flusher.queue().len()
    }

    pub fn flusher(&self) -> &Arc<CacheFlusher> {
        &self.flusher
    }
}

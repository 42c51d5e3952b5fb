//! Executes flush plans against the entry store.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::events::EventQueue;
use super::pipeline::METRIC_BACKEND_ERROR;
use super::planner::FlushPlan;
use super::store::EntryStore;

pub const METRIC_FLUSH_MS: &str = "pagecache_flush_ms";
pub const METRIC_FLUSHED_ENTRIES: &str = "pagecache_flushed_entries_total";

/// Drains the change queue and evicts the implicated entries.
pub struct CacheFlusher {
    store: Arc<EntryStore>,
    queue: Arc<EventQueue>,
    batch_limit: usize,
}

impl CacheFlusher {
    pub fn new(store: Arc<EntryStore>, queue: Arc<EventQueue>, batch_limit: usize) -> Self {
        Self {
            store,
            queue,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Flush one batch of pending changes.
    ///
    /// Returns the number of evicted entries, or `None` when the queue was empty.
    #[instrument(skip(self))]
    pub async fn flush_batch(&self) -> Option<usize> {
        let started_at = Instant::now();
        let events = self.queue.drain(self.batch_limit);
        if events.is_empty() {
            return None;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = FlushPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache flush starting"
        );

        let evicted = match self.store.flush_by_tags(&plan.tag_list()).await {
            Ok(evicted) => evicted,
            Err(err) => {
                counter!(METRIC_BACKEND_ERROR, "op" => "flush").increment(1);
                warn!(error = %err, plan = %plan, "Cache flush failed");
                0
            }
        };

        info!(event_count, evicted, identifiers = ?plan.identifiers, "Cache flush complete");
        counter!(METRIC_FLUSHED_ENTRIES).increment(evicted as u64);
        histogram!(METRIC_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        Some(evicted)
    }

    /// Flush batches until the queue is empty.
    pub async fn flush_pending(&self) -> usize {
        let mut total = 0;
        while let Some(evicted) = self.flush_batch().await {
            total += evicted;
        }
        total
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }
}

//! Content change queue.
//!
//! Writes publish [`ContentChange`]s here; the flusher drains them in batches.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub const METRIC_PENDING_CHANGES: &str = "pagecache_pending_changes";

/// Monotonic sequence number of an event within this process.
pub type Epoch = u64;

/// What happened to a content unit. All kinds invalidate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
    Published,
    Discarded,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::Published => "published",
            Self::Discarded => "discarded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub identifier: String,
    pub type_name: String,
    pub kind: ChangeKind,
}

impl ContentChange {
    pub fn new(identifier: impl Into<String>, type_name: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            identifier: identifier.into(),
            type_name: type_name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Idempotency key.
    pub id: Uuid,
    pub epoch: Epoch,
    pub change: ContentChange,
    pub timestamp: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(change: ContentChange, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            change,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

pub struct EventQueue {
    queue: Mutex<VecDeque<ChangeEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, change: ContentChange) {
        let event = ChangeEvent::new(change, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            identifier = %event.change.identifier,
            type_name = %event.change.type_name,
            kind = %event.change.kind,
            "Content change enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_PENDING_CHANGES).set(queue.len() as f64);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<ChangeEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let events = queue.drain(..count).collect();
        gauge!(METRIC_PENDING_CHANGES).set(queue.len() as f64);
        events
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

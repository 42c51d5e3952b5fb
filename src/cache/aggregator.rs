//! Per-request collection of segment cache metadata.
//!
//! A rendered page is composed of many segments. The page may only be cached
//! for as long as its shortest-lived segment and must carry the union of all
//! segment tags. One [`SegmentCollector`] is created per request by the page
//! cache pipeline and handed to generators through request extensions.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::entry::EntryMetadata;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::aggregator";

/// Read-only projection of what one response was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedCacheInfo {
    pub has_uncacheable_segment: bool,
    pub tags: BTreeSet<String>,
    /// Minimum over all segments that declared a lifetime.
    pub lifetime: Option<u64>,
}

/// Running tags, minimum lifetime and uncacheable flag.
#[derive(Debug, Default)]
pub struct MetadataAggregator {
    has_uncacheable_segment: bool,
    tags: BTreeSet<String>,
    lifetime: Option<u64>,
}

impl MetadataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_segment_cached<I, S>(&mut self, tags: I, lifetime: Option<u64>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        if let Some(lifetime) = lifetime
            && self.lifetime.is_none_or(|current| lifetime < current)
        {
            self.lifetime = Some(lifetime);
        }
    }

    /// Sticky: once set it stays set for this aggregator.
    pub fn on_uncacheable_segment(&mut self) {
        self.has_uncacheable_segment = true;
    }

    pub fn snapshot(&self) -> AggregatedCacheInfo {
        AggregatedCacheInfo {
            has_uncacheable_segment: self.has_uncacheable_segment,
            tags: self.tags.clone(),
            lifetime: self.lifetime,
        }
    }
}

#[derive(Debug, Default)]
struct CollectorState {
    aggregator: MetadataAggregator,
    /// Metadata of every segment entry read or written during this request.
    entries: HashMap<String, EntryMetadata>,
}

/// Request-scoped handle generators use to report segments.
///
/// Cloning shares the same state; a fresh collector must be created for
/// every request.
#[derive(Debug, Clone, Default)]
pub struct SegmentCollector {
    state: Arc<Mutex<CollectorState>>,
}

impl SegmentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment_cached<I, S>(&self, tags: I, lifetime: Option<u64>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        mutex_lock(&self.state, SOURCE, "segment_cached")
            .aggregator
            .on_segment_cached(tags, lifetime);
    }

    pub fn segment_uncacheable(&self) {
        mutex_lock(&self.state, SOURCE, "segment_uncacheable")
            .aggregator
            .on_uncacheable_segment();
    }

    /// Record metadata recovered from a segment store read or write.
    pub fn record_entry(&self, metadata: &EntryMetadata) {
        let mut state = mutex_lock(&self.state, SOURCE, "record_entry");
        state
            .aggregator
            .on_segment_cached(metadata.tags.iter().cloned(), metadata.lifetime);
        state
            .entries
            .insert(metadata.identifier.clone(), metadata.clone());
    }

    /// Metadata recorded for one segment identifier, if it was touched.
    #[cfg(test)]
    pub(crate) fn entry_metadata(&self, identifier: &str) -> Option<EntryMetadata> {
        mutex_lock(&self.state, SOURCE, "entry_metadata")
            .entries
            .get(identifier)
            .cloned()
    }

    pub fn recorded_entries(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "recorded_entries")
            .entries
            .len()
    }

    pub fn snapshot(&self) -> AggregatedCacheInfo {
        mutex_lock(&self.state, SOURCE, "snapshot")
            .aggregator
            .snapshot()
    }
}

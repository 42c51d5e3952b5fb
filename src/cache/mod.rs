//! Tag-aware full-page cache.
//!
//! - [`RequestCachePipeline`] decides per request whether to serve a stored
//!   page, and per response whether to store it.
//! - [`SegmentCollector`] and [`FragmentCache`] let renderers report the tags
//!   and lifetimes of the segments a page is built from.
//! - [`InvalidationTrigger`] turns content changes into tag flushes.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! max_public_cache_time = 120
//! query_params.allow = ["page"]
//! query_params.ignore = ["utm_source"]
//! cookie_params.ignore = ["_ga"]
//! # ... see config.rs for all options
//! ```

mod aggregator;
mod backend;
mod classifier;
mod clock;
mod config;
mod entry;
mod error;
mod events;
mod flusher;
mod fragment;
mod index;
mod keys;
mod lock;
mod middleware;
mod pipeline;
mod planner;
mod store;
mod tags;
mod trigger;

pub use aggregator::{AggregatedCacheInfo, MetadataAggregator, SegmentCollector};
pub use backend::{CacheBackend, MemoryBackend};
pub use classifier::{AuthenticatedSession, Classifier, Rejection, RequestFacts, Storability};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CookieParamRules, ExecutionContext, FlushMode, QueryParamRules};
pub use entry::{CacheEntry, EntryMetadata, StoredResponse};
pub use error::{BackendError, StoreError};
pub use events::{ChangeEvent, ChangeKind, ContentChange, Epoch, EventQueue};
pub use flusher::CacheFlusher;
pub use fragment::FragmentCache;
pub use index::TagIndex;
pub use keys::{CacheKey, etag_for, hash_hex};
pub use middleware::{PageCacheState, page_cache_layer};
pub use pipeline::{HEADER_ENABLED, HEADER_INFO, HEADER_LIFETIME, HEADER_TAGS, RequestCachePipeline};
pub use planner::FlushPlan;
pub use store::EntryStore;
pub use tags::{content_tag, sanitize_tag, sanitize_tags, type_tag};
pub use trigger::InvalidationTrigger;

/// Metric names, for describing them at startup.
pub mod metric_names {
    pub use super::backend::METRIC_EVICT_TOTAL as EVICT;
    pub use super::events::METRIC_PENDING_CHANGES as PENDING_CHANGES;
    pub use super::flusher::{METRIC_FLUSH_MS as FLUSH_MS, METRIC_FLUSHED_ENTRIES as FLUSHED_ENTRIES};
    pub use super::pipeline::{
        METRIC_BACKEND_ERROR as BACKEND_ERROR, METRIC_HIT as HIT, METRIC_MISS as MISS,
        METRIC_NOT_MODIFIED as NOT_MODIFIED, METRIC_SKIP as SKIP, METRIC_STORE as STORE,
    };
}

//! Page cache configuration.
//!
//! Loaded from the `[cache]` section of `pagecache.toml`. Every list defaults
//! to empty, which keeps requests with query strings or cookies out of the
//! cache.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_AUTO_FLUSH_INTERVAL_MS: u64 = 1000;
const DEFAULT_FLUSH_BATCH_LIMIT: usize = 256;

/// Execution context deciding how corrupt entries are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Corrupt entries surface as errors.
    Development,
    /// Corrupt entries are logged and served without metadata.
    #[default]
    Production,
}

impl ExecutionContext {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// When queued content changes are turned into a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Flush as soon as a change is reported.
    Immediate,
    /// Coalesce changes until the unit of work commits.
    #[default]
    Deferred,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryParamRules {
    /// Parameters kept in the cache key.
    pub allow: Vec<String>,
    /// Parameters dropped from the cache key.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CookieParamRules {
    /// Cookies that do not affect cacheability.
    pub ignore: Vec<String>,
}

/// Page cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off the layer forwards every request untouched.
    pub enabled: bool,
    /// Upper bound in seconds for `Cache-Control: max-age`. 0 disables public headers.
    pub max_public_cache_time: u64,
    pub query_params: QueryParamRules,
    pub cookie_params: CookieParamRules,
    pub context: ExecutionContext,
    /// Maximum entries held by the in-memory backend.
    pub capacity: usize,
    /// Responses larger than this are never buffered for storage.
    pub max_body_bytes: usize,
    pub flush_mode: FlushMode,
    /// Background flush cadence (ms) for deferred content changes.
    pub auto_flush_interval_ms: u64,
    /// Maximum content changes folded into one flush.
    pub flush_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_public_cache_time: 0,
            query_params: QueryParamRules::default(),
            cookie_params: CookieParamRules::default(),
            context: ExecutionContext::default(),
            capacity: DEFAULT_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            flush_mode: FlushMode::default(),
            auto_flush_interval_ms: DEFAULT_AUTO_FLUSH_INTERVAL_MS,
            flush_batch_limit: DEFAULT_FLUSH_BATCH_LIMIT,
        }
    }
}

impl CacheConfig {
    /// Returns the backend capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the flush batch limit, clamping to 1 if zero.
    pub fn flush_batch_limit_non_zero(&self) -> usize {
        self.flush_batch_limit.max(1)
    }
}

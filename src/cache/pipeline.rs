//! Full-page request cache.
//!
//! Per request: classify, look up, serve a hit (or `304`), otherwise run the
//! generator with a fresh [`SegmentCollector`], classify the response and
//! store it. Cache failures only ever degrade to a miss or a dropped write.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, warn};

use super::aggregator::SegmentCollector;
use super::classifier::{Classifier, Storability};
use super::config::CacheConfig;
use super::entry::{CacheEntry, StoredResponse};
use super::keys::{CacheKey, etag_for};
use super::store::EntryStore;
use super::tags::sanitize_tags;

/// Request marker set on the way in; on a response it opts into hint headers.
pub const HEADER_ENABLED: HeaderName = HeaderName::from_static("x-pagecache-enabled");
/// Lifetime hint in seconds.
pub const HEADER_LIFETIME: HeaderName = HeaderName::from_static("x-pagecache-lifetime");
/// Comma separated tag hints, may repeat.
pub const HEADER_TAGS: HeaderName = HeaderName::from_static("x-pagecache-tags");
/// Diagnostics: `HIT: <key>`, `MISS: <key>` or `SKIP`.
pub const HEADER_INFO: HeaderName = HeaderName::from_static("x-pagecache-info");

pub const METRIC_HIT: &str = "pagecache_hit_total";
pub const METRIC_MISS: &str = "pagecache_miss_total";
pub const METRIC_SKIP: &str = "pagecache_skip_total";
pub const METRIC_NOT_MODIFIED: &str = "pagecache_not_modified_total";
pub const METRIC_STORE: &str = "pagecache_store_total";
pub const METRIC_BACKEND_ERROR: &str = "pagecache_backend_error_total";

const INTERNAL_HEADERS: [HeaderName; 3] = [HEADER_ENABLED, HEADER_LIFETIME, HEADER_TAGS];

pub struct RequestCachePipeline {
    config: CacheConfig,
    classifier: Classifier,
    store: Arc<EntryStore>,
}

/// Request attributes needed after the request itself has moved on.
struct Conditional {
    if_none_match: Vec<String>,
    is_head: bool,
}

impl Conditional {
    fn from_request(request: &Request<Body>) -> Self {
        let if_none_match = request
            .headers()
            .get_all(header::IF_NONE_MATCH)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        Self {
            if_none_match,
            is_head: request.method() == Method::HEAD,
        }
    }

    fn matches(&self, etag: &str) -> bool {
        self.if_none_match.iter().any(|candidate| candidate == etag)
    }
}

impl RequestCachePipeline {
    pub fn new(config: CacheConfig, store: Arc<EntryStore>) -> Self {
        Self {
            classifier: Classifier::new(&config),
            config,
            store,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub async fn handle<G, Fut>(&self, request: Request<Body>, generator: G) -> Response
    where
        G: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        if !self.config.enabled {
            return generator(request).await;
        }

        let Some(key) = self.classifier.classify(&request) else {
            counter!(METRIC_SKIP).increment(1);
            debug!(outcome = "skip", "Request bypasses page cache");
            let mut response = generator(request).await;
            strip_internal_headers(response.headers_mut());
            set_info(&mut response, "SKIP");
            return response;
        };

        let conditional = Conditional::from_request(&request);
        if let Some(response) = self.serve_from_store(&key, &conditional).await {
            return response;
        }

        self.generate_and_store(key, conditional, request, generator)
            .await
    }

    async fn serve_from_store(&self, key: &CacheKey, conditional: &Conditional) -> Option<Response> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                counter!(METRIC_BACKEND_ERROR, "op" => "get").increment(1);
                warn!(key = %key, error = %err, "Page cache lookup failed, treating as miss");
                return None;
            }
        };
        let now = self.store.clock().now();

        if entry.metadata.is_none() {
            debug!(key = %key, outcome = "degraded", "Cached page has no metadata, regenerating");
            return None;
        }
        if entry.is_expired(now) {
            debug!(key = %key, outcome = "expired", "Cached page outlived its lifetime");
            return None;
        }

        let stored = match StoredResponse::from_bytes(key.as_str(), &entry.payload) {
            Ok(stored) => stored,
            Err(err) => {
                error!(key = %key, error = %err, "Cached page payload unreadable, regenerating");
                return None;
            }
        };

        let etag = stored
            .header(header::ETAG.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| etag_for(&stored.body));

        if conditional.matches(&etag) {
            counter!(METRIC_NOT_MODIFIED).increment(1);
            debug!(key = %key, outcome = "not_modified", "Conditional request matched cached page");
            return Some(self.not_modified(key, &etag, &entry, now));
        }

        counter!(METRIC_HIT).increment(1);
        debug!(key = %key, outcome = "hit", "Serving cached page");
        Some(self.cached_response(key, stored, &entry, now, conditional.is_head))
    }

    fn not_modified(
        &self,
        key: &CacheKey,
        etag: &str,
        entry: &CacheEntry,
        now: time::OffsetDateTime,
    ) -> Response {
        let max_public = self.config.max_public_cache_time;
        let max_age = match entry.remaining_lifetime(now) {
            Some(remaining) if max_public > 0 => Some(remaining.min(max_public)),
            Some(remaining) => Some(remaining),
            None => (max_public > 0).then_some(max_public),
        };

        let mut response = StatusCode::NOT_MODIFIED.into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(etag) {
            headers.insert(header::ETAG, value);
        }
        if let Some(max_age) = max_age {
            headers.insert(header::CACHE_CONTROL, header_value(&format!("max-age={max_age}")));
        }
        set_info(&mut response, &format!("HIT: {key}"));
        response
    }

    fn cached_response(
        &self,
        key: &CacheKey,
        stored: StoredResponse,
        entry: &CacheEntry,
        now: time::OffsetDateTime,
        is_head: bool,
    ) -> Response {
        let mut builder = Response::builder().status(stored.status);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in &stored.headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    headers.append(name, value);
                }
            }
            strip_internal_headers(headers);

            let age = entry.age(now).unwrap_or(0);
            headers.insert(header::AGE, header_value(&age.to_string()));

            let max_public = self.config.max_public_cache_time;
            if max_public > 0 {
                let max_age = entry
                    .remaining_lifetime(now)
                    .map_or(max_public, |remaining| remaining.min(max_public));
                headers.insert(
                    header::CACHE_CONTROL,
                    header_value(&format!("public, max-age={max_age}")),
                );
            }
        }

        let body = if is_head {
            Body::empty()
        } else {
            Body::from(stored.body)
        };
        let mut response = builder
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        set_info(&mut response, &format!("HIT: {key}"));
        response
    }

    async fn generate_and_store<G, Fut>(
        &self,
        key: CacheKey,
        conditional: Conditional,
        mut request: Request<Body>,
        generator: G,
    ) -> Response
    where
        G: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        counter!(METRIC_MISS).increment(1);
        let collector = SegmentCollector::new();
        request.extensions_mut().insert(collector.clone());
        request
            .headers_mut()
            .insert(HEADER_ENABLED, HeaderValue::from_static("1"));

        let mut response = generator(request).await;
        merge_hint_headers(&collector, response.headers());
        strip_internal_headers(response.headers_mut());
        let info = format!("MISS: {key}");

        // A HEAD response has no body to store under the shared key.
        if conditional.is_head {
            set_info(&mut response, &info);
            return response;
        }

        // Bodies without a known upper bound are never buffered.
        let max_body_bytes = u64::try_from(self.config.max_body_bytes).unwrap_or(u64::MAX);
        let fits = response
            .body()
            .size_hint()
            .upper()
            .is_some_and(|upper| upper <= max_body_bytes);
        if !fits {
            debug!(key = %key, outcome = "miss", reason = "oversized", "Page not stored");
            set_info(&mut response, &info);
            return response;
        }

        let aggregate = collector.snapshot();
        let (tags, lifetime) = match self.classifier.classify_response(
            &aggregate,
            response.status(),
            response.headers(),
        ) {
            Storability::Storable { tags, lifetime } => (tags, lifetime),
            Storability::NotStorable(reason) => {
                debug!(key = %key, outcome = "miss", %reason, "Page not stored");
                set_info(&mut response, &info);
                return response;
            }
        };

        let (mut parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, self.config.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to buffer generated page");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let public_lifetime = self.public_lifetime(lifetime);
        if public_lifetime > 0 {
            parts
                .headers
                .insert(header::ETAG, header_value(&etag_for(&bytes)));
            parts.headers.insert(
                header::CACHE_CONTROL,
                header_value(&format!("public, max-age={public_lifetime}")),
            );
        }

        let stored = StoredResponse {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .filter(|(name, _)| **name != HEADER_INFO)
                .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
                .collect(),
            body: bytes.clone(),
        };
        self.persist(&key, &stored, &tags, lifetime).await;

        let mut response = Response::from_parts(parts, Body::from(bytes));
        set_info(&mut response, &info);
        response
    }

    async fn persist(
        &self,
        key: &CacheKey,
        stored: &StoredResponse,
        tags: &[String],
        lifetime: Option<u64>,
    ) {
        let result = match stored.to_bytes(key.as_str()) {
            Ok(payload) => self.store.set(key, &payload, tags, lifetime).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(_) => {
                counter!(METRIC_STORE).increment(1);
                debug!(key = %key, tags = tags.len(), ?lifetime, "Page stored");
            }
            Err(err) => {
                counter!(METRIC_BACKEND_ERROR, "op" => "set").increment(1);
                warn!(key = %key, error = %err, "Failed to store page");
            }
        }
    }

    /// `max-age` advertised to clients for a freshly stored page.
    ///
    /// Pages without an internal lifetime advertise the configured maximum.
    pub fn public_lifetime(&self, lifetime: Option<u64>) -> u64 {
        let max_public = self.config.max_public_cache_time;
        if max_public == 0 {
            return 0;
        }
        lifetime.map_or(max_public, |lifetime| lifetime.min(max_public))
    }
}

/// Hints only count when the response echoes the enabled marker.
fn merge_hint_headers(collector: &SegmentCollector, headers: &HeaderMap) {
    if !headers.contains_key(HEADER_ENABLED) {
        return;
    }
    let tags: Vec<&str> = headers
        .get_all(HEADER_TAGS)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .collect();
    let lifetime = headers
        .get(HEADER_LIFETIME)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    if !tags.is_empty() || lifetime.is_some() {
        collector.segment_cached(sanitize_tags(tags), lifetime);
    }
}

fn strip_internal_headers(headers: &mut HeaderMap) {
    for name in INTERNAL_HEADERS {
        headers.remove(name);
    }
    headers.remove(HEADER_INFO);
}

fn set_info(response: &mut Response, value: &str) {
    response.headers_mut().insert(HEADER_INFO, header_value(value));
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

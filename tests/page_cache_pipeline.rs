use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use pagecache::cache::{
    BackendError, CacheBackend, CacheConfig, CacheKey, CookieParamRules, EntryStore,
    ExecutionContext, HEADER_ENABLED, HEADER_INFO, HEADER_LIFETIME, HEADER_TAGS, ManualClock,
    MemoryBackend, PageCacheState, QueryParamRules, RequestCachePipeline, SegmentCollector,
    page_cache_layer,
};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

const BODY: &str = "<p>page</p>";

#[derive(Clone, Default)]
struct Page {
    tags: Vec<&'static str>,
    lifetime: Option<u64>,
    hint_tags: Option<&'static str>,
    hint_lifetime: Option<&'static str>,
    set_cookie: bool,
    uncacheable: bool,
}

impl Page {
    fn tagged(lifetime: Option<u64>) -> Self {
        Self {
            tags: vec!["Acme.Site:Page", "page-1"],
            lifetime,
            ..Self::default()
        }
    }
}

struct Harness {
    app: Router,
    store: Arc<EntryStore>,
    clock: Arc<ManualClock>,
    calls: Arc<AtomicUsize>,
}

fn harness(config: CacheConfig, page: Page) -> Harness {
    let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(&config));
    harness_with_backend(config, page, backend)
}

fn harness_with_backend(
    config: CacheConfig,
    page: Page,
    backend: Arc<dyn CacheBackend>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH + Duration::days(1)));
    let store = Arc::new(EntryStore::new(backend, config.context, clock.clone()));
    let pipeline = Arc::new(RequestCachePipeline::new(config, store.clone()));
    let calls = Arc::new(AtomicUsize::new(0));

    let handler_calls = calls.clone();
    let app = Router::new()
        .route(
            "/page",
            get(move |collector: Option<Extension<SegmentCollector>>| {
                let page = page.clone();
                let calls = handler_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    render(page, collector)
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            PageCacheState::new(pipeline),
            page_cache_layer,
        ));

    Harness {
        app,
        store,
        clock,
        calls,
    }
}

fn render(page: Page, collector: Option<Extension<SegmentCollector>>) -> Response {
    if let Some(Extension(collector)) = collector {
        if page.uncacheable {
            collector.segment_uncacheable();
        }
        if !page.tags.is_empty() {
            collector.segment_cached(page.tags.iter().copied(), page.lifetime);
        }
    }

    let mut response = BODY.into_response();
    let headers = response.headers_mut();
    if let Some(tags) = page.hint_tags {
        headers.insert(HEADER_ENABLED, HeaderValue::from_static("1"));
        headers.insert(HEADER_TAGS, HeaderValue::from_static(tags));
    }
    if let Some(lifetime) = page.hint_lifetime {
        headers.insert(HEADER_LIFETIME, HeaderValue::from_static(lifetime));
    }
    if page.set_cookie {
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=1"));
    }
    response
}

fn config(max_public: u64) -> CacheConfig {
    CacheConfig {
        max_public_cache_time: max_public,
        query_params: QueryParamRules {
            allow: vec!["page".to_string()],
            ignore: vec!["utm_source".to_string()],
        },
        cookie_params: CookieParamRules {
            ignore: vec!["_ga".to_string()],
        },
        ..CacheConfig::default()
    }
}

fn request(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::HOST, "example.test")
}

async fn send(harness: &Harness, request: Request<Body>) -> Response {
    harness
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn fetch(harness: &Harness, uri: &str) -> Response {
    send(harness, request(uri).body(Body::empty()).expect("request")).await
}

fn info(response: &Response) -> &str {
    response
        .headers()
        .get(HEADER_INFO)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

async fn body(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

fn stored_key(response: &Response) -> CacheKey {
    let info = info(response);
    let key = info.strip_prefix("MISS: ").expect("miss info carries the key");
    CacheKey::from_identifier(key)
}

#[tokio::test]
async fn conditional_request_within_lifetime_is_not_modified() {
    let harness = harness(config(120), Page::tagged(Some(60)));

    let first = fetch(&harness, "/page").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(info(&first).starts_with("MISS: "));
    assert_eq!(
        header_str(&first, header::CACHE_CONTROL),
        Some("public, max-age=60")
    );
    let etag = header_str(&first, header::ETAG)
        .expect("stored page carries an etag")
        .to_string();

    harness.clock.advance(Duration::seconds(30));
    let conditional = send(
        &harness,
        request("/page")
            .header(header::IF_NONE_MATCH, &etag)
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(conditional.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(
        header_str(&conditional, header::CACHE_CONTROL),
        Some("max-age=30")
    );
    assert_eq!(header_str(&conditional, header::ETAG), Some(etag.as_str()));
    assert!(body(conditional).await.is_empty());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hit_reports_age_and_remaining_lifetime() {
    let harness = harness(config(120), Page::tagged(Some(60)));
    fetch(&harness, "/page").await;

    harness.clock.advance(Duration::seconds(10));
    let hit = fetch(&harness, "/page").await;

    assert!(info(&hit).starts_with("HIT: "));
    assert_eq!(header_str(&hit, header::AGE), Some("10"));
    assert_eq!(
        header_str(&hit, header::CACHE_CONTROL),
        Some("public, max-age=50")
    );
    assert_eq!(body(hit).await, BODY.as_bytes());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn entry_past_its_lifetime_is_regenerated() {
    let harness = harness(config(120), Page::tagged(Some(60)));
    fetch(&harness, "/page").await;

    harness.clock.advance(Duration::seconds(70));
    let response = fetch(&harness, "/page").await;

    assert!(info(&response).starts_with("MISS: "));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn public_max_age_is_capped_but_internal_lifetime_is_kept() {
    let harness = harness(config(120), Page::tagged(Some(600)));

    let response = fetch(&harness, "/page").await;
    assert_eq!(
        header_str(&response, header::CACHE_CONTROL),
        Some("public, max-age=120")
    );

    let entry = harness
        .store
        .get(&stored_key(&response))
        .await
        .expect("store read")
        .expect("page stored");
    let metadata = entry.metadata.expect("metadata");
    assert_eq!(metadata.lifetime, Some(600));
    assert!(metadata.tags.contains(&"Acme_Site-Page".to_string()));
    assert!(metadata.tags.contains(&"page-1".to_string()));
}

#[tokio::test]
async fn zero_public_max_adds_no_client_headers() {
    let harness = harness(config(0), Page::tagged(Some(60)));

    let first = fetch(&harness, "/page").await;
    assert!(header_str(&first, header::CACHE_CONTROL).is_none());
    assert!(header_str(&first, header::ETAG).is_none());

    let second = fetch(&harness, "/page").await;
    assert!(info(&second).starts_with("HIT: "));
    assert!(header_str(&second, header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn untagged_page_is_not_stored_and_only_gains_diagnostics() {
    let harness = harness(config(120), Page::default());

    let first = fetch(&harness, "/page").await;
    assert!(info(&first).starts_with("MISS: "));
    assert!(header_str(&first, header::CACHE_CONTROL).is_none());
    assert!(header_str(&first, header::ETAG).is_none());
    assert_eq!(body(first).await, BODY.as_bytes());

    let second = fetch(&harness, "/page").await;
    assert!(info(&second).starts_with("MISS: "));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn page_larger_than_body_limit_is_served_but_not_stored() {
    let harness = harness(
        CacheConfig {
            max_body_bytes: 4,
            ..config(120)
        },
        Page::tagged(Some(60)),
    );

    for _ in 0..2 {
        let response = fetch(&harness, "/page").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(info(&response).starts_with("MISS: "));
        assert!(header_str(&response, header::ETAG).is_none());
        assert_eq!(body(response).await, BODY.as_bytes());
    }
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_lifetime_segment_prevents_storage() {
    let harness = harness(config(120), Page::tagged(Some(0)));
    fetch(&harness, "/page").await;
    fetch(&harness, "/page").await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn query_parameters_follow_allow_and_ignore_lists() {
    let harness = harness(config(120), Page::tagged(None));

    let skipped = fetch(&harness, "/page?sort=asc").await;
    assert_eq!(info(&skipped), "SKIP");
    assert_eq!(skipped.status(), StatusCode::OK);

    fetch(&harness, "/page").await;
    let ignored = fetch(&harness, "/page?utm_source=mail").await;
    assert!(info(&ignored).starts_with("HIT: "));

    let allowed = fetch(&harness, "/page?page=2").await;
    assert!(info(&allowed).starts_with("MISS: "));
    let again = fetch(&harness, "/page?page=2").await;
    assert!(info(&again).starts_with("HIT: "));

    // skip, bare, page=2
    assert_eq!(harness.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn untracked_cookies_and_credentials_bypass_the_cache() {
    let harness = harness(config(120), Page::tagged(None));
    fetch(&harness, "/page").await;

    let tracking = send(
        &harness,
        request("/page")
            .header(header::COOKIE, "_ga=GA1.2.3")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert!(info(&tracking).starts_with("HIT: "));

    let session = send(
        &harness,
        request("/page")
            .header(header::COOKIE, "_ga=GA1.2.3; session=abc")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(info(&session), "SKIP");

    let authorized = send(
        &harness,
        request("/page")
            .header(header::AUTHORIZATION, "Bearer token")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(info(&authorized), "SKIP");
}

#[tokio::test]
async fn non_get_methods_bypass_the_cache() {
    let harness = harness(config(120), Page::tagged(None));
    let response = send(
        &harness,
        request("/page")
            .method(Method::POST)
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    // The route only answers GET; the cache still stays out of the way.
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(info(&response), "SKIP");
}

#[tokio::test]
async fn set_cookie_response_is_not_stored() {
    let page = Page {
        set_cookie: true,
        ..Page::tagged(None)
    };
    let harness = harness(config(120), page);

    let first = fetch(&harness, "/page").await;
    assert!(header_str(&first, header::SET_COOKIE).is_some());
    fetch(&harness, "/page").await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn uncacheable_segment_is_never_stored() {
    let page = Page {
        uncacheable: true,
        ..Page::tagged(Some(60))
    };
    let harness = harness(config(120), page);

    fetch(&harness, "/page").await;
    let second = fetch(&harness, "/page").await;
    assert!(info(&second).starts_with("MISS: "));
    assert!(header_str(&second, header::CACHE_CONTROL).is_none());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hint_headers_tag_the_page_and_are_stripped() {
    let page = Page {
        hint_tags: Some("Acme.Site:Article, news"),
        hint_lifetime: Some("45"),
        ..Page::default()
    };
    let harness = harness(config(120), page);

    let response = fetch(&harness, "/page").await;
    assert!(response.headers().get(HEADER_ENABLED).is_none());
    assert!(response.headers().get(HEADER_TAGS).is_none());
    assert!(response.headers().get(HEADER_LIFETIME).is_none());
    assert_eq!(
        header_str(&response, header::CACHE_CONTROL),
        Some("public, max-age=45")
    );

    let hit = fetch(&harness, "/page").await;
    assert!(info(&hit).starts_with("HIT: "));
    assert!(hit.headers().get(HEADER_TAGS).is_none());

    let evicted = harness
        .store
        .flush_by_tags(&["Acme_Site-Article".to_string()])
        .await
        .expect("flush");
    assert_eq!(evicted, 1);

    let after = fetch(&harness, "/page").await;
    assert!(info(&after).starts_with("MISS: "));
}

#[tokio::test]
async fn head_hit_has_no_body() {
    let harness = harness(config(120), Page::tagged(None));
    fetch(&harness, "/page").await;

    let head = send(
        &harness,
        request("/page")
            .method(Method::HEAD)
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert!(info(&head).starts_with("HIT: "));
    assert!(body(head).await.is_empty());
}

#[tokio::test]
async fn disabled_cache_passes_requests_through() {
    let config = CacheConfig {
        enabled: false,
        ..config(120)
    };
    let harness = harness(config, Page::tagged(None));

    let response = fetch(&harness, "/page").await;
    assert!(response.headers().get(HEADER_INFO).is_none());
    fetch(&harness, "/page").await;
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

struct FailingBackend;

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, BackendError> {
        Err(BackendError::operation("get", "connection refused"))
    }

    async fn set(
        &self,
        _key: &str,
        _value: Bytes,
        _tags: &[String],
        _lifetime: Option<u64>,
    ) -> Result<(), BackendError> {
        Err(BackendError::operation("set", "connection refused"))
    }

    async fn flush_by_tags(&self, _tags: &[String]) -> Result<usize, BackendError> {
        Err(BackendError::operation("flush_by_tags", "connection refused"))
    }

    async fn flush(&self) -> Result<(), BackendError> {
        Err(BackendError::operation("flush", "connection refused"))
    }
}

#[tokio::test]
async fn backend_failures_degrade_to_uncached_responses() {
    let config = CacheConfig {
        context: ExecutionContext::Production,
        ..config(120)
    };
    let harness = harness_with_backend(config, Page::tagged(Some(60)), Arc::new(FailingBackend));

    for _ in 0..2 {
        let response = fetch(&harness, "/page").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(info(&response).starts_with("MISS: "));
        assert_eq!(body(response).await, BODY.as_bytes());
    }
    assert_eq!(harness.calls.load(Ordering::SeqCst), 2);
}

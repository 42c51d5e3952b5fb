//! Axum glue for the page cache.

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::instrument;

use super::pipeline::RequestCachePipeline;

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct PageCacheState {
    pub pipeline: Arc<RequestCachePipeline>,
}

impl PageCacheState {
    pub fn new(pipeline: Arc<RequestCachePipeline>) -> Self {
        Self { pipeline }
    }
}

/// Full-page cache in front of the wrapped routes.
///
/// Install with `axum::middleware::from_fn_with_state`.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<PageCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    cache
        .pipeline
        .handle(request, |request| next.run(request))
        .await
}

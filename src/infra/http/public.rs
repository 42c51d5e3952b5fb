use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::{
    application::{error::AppError, render::PageRenderer},
    cache::{PageCacheState, SegmentCollector, page_cache_layer},
};

use super::{
    health,
    middleware::{log_responses, set_request_context},
};

const HOME_IDENTIFIER: &str = "home";

#[derive(Clone)]
pub struct PublicState {
    pub renderer: Arc<PageRenderer>,
}

/// Content routes sit behind the page cache when `cache` is given.
pub fn build_public_router(state: PublicState, cache: Option<PageCacheState>) -> Router {
    let cached_routes = Router::new()
        .route("/", get(home))
        .route("/{identifier}", get(page));

    let cached_routes = match cache {
        Some(cache) => {
            cached_routes.layer(middleware::from_fn_with_state(cache, page_cache_layer))
        }
        None => cached_routes,
    };

    let uncached_routes = Router::new().route("/_health", get(health));

    cached_routes
        .merge(uncached_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    /// Personalises the page, which makes it uncacheable.
    name: Option<String>,
}

async fn home(
    State(state): State<PublicState>,
    collector: Option<Extension<SegmentCollector>>,
    Query(query): Query<PageQuery>,
) -> Response {
    render_page(&state, HOME_IDENTIFIER, collector, query).await
}

async fn page(
    State(state): State<PublicState>,
    Path(identifier): Path<String>,
    collector: Option<Extension<SegmentCollector>>,
    Query(query): Query<PageQuery>,
) -> Response {
    render_page(&state, &identifier, collector, query).await
}

async fn render_page(
    state: &PublicState,
    identifier: &str,
    collector: Option<Extension<SegmentCollector>>,
    query: PageQuery,
) -> Response {
    // Without the cache layer nobody reads the collected metadata.
    let collector = collector.map(|Extension(collector)| collector).unwrap_or_default();
    let result: Result<String, AppError> = state
        .renderer
        .render(identifier, &collector, query.name.as_deref())
        .await;
    match result {
        Ok(html) => Html(html).into_response(),
        Err(err) => err.into_response(),
    }
}

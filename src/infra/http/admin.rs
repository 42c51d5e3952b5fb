use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    application::{content::ContentService, error::AppError},
    cache::{ChangeKind, InvalidationTrigger},
    domain::content::ContentNode,
};

use super::{
    health,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub content: Arc<ContentService>,
    pub trigger: Arc<InvalidationTrigger>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/content/{identifier}",
            put(upsert_content).delete(remove_content),
        )
        .route("/cache/flush", post(flush_cache))
        .route("/cache/commit", post(commit_changes))
        .route("/cache/pending", get(pending_changes))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    type_name: String,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlushRequest {
    tags: Vec<String>,
}

async fn upsert_content(
    State(state): State<AdminState>,
    Path(identifier): Path<String>,
    Json(payload): Json<ContentPayload>,
) -> Result<Response, AppError> {
    let node = ContentNode {
        identifier: identifier.clone(),
        type_name: payload.type_name,
        title: payload.title,
        body: payload.body,
        parent: payload.parent,
    };
    let kind = state.content.upsert(node).await?;
    let status = match kind {
        ChangeKind::Created => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    let body = json!({ "identifier": identifier, "change": kind.to_string() });
    Ok((status, Json(body)).into_response())
}

async fn remove_content(
    State(state): State<AdminState>,
    Path(identifier): Path<String>,
) -> Result<StatusCode, AppError> {
    state.content.remove(&identifier).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// An empty body flushes everything; otherwise `{"tags": [...]}`.
async fn flush_cache(State(state): State<AdminState>, body: Bytes) -> Result<Response, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        state.trigger.flush_all().await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let request: FlushRequest =
        serde_json::from_slice(&body).map_err(|err| AppError::bad_request(err.to_string()))?;
    let flushed = state.trigger.flush_tags(&request.tags).await?;
    Ok(Json(json!({ "flushed": flushed })).into_response())
}

async fn commit_changes(State(state): State<AdminState>) -> Json<serde_json::Value> {
    let flushed = state.content.commit().await;
    Json(json!({ "flushed": flushed }))
}

async fn pending_changes(State(state): State<AdminState>) -> Json<serde_json::Value> {
    Json(json!({ "pending": state.trigger.pending() }))
}

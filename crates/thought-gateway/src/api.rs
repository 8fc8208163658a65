use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use thought_common::Error;
use thought_db::{DigestWindow, Thought};
use tracing::{debug, warn};

use crate::ingest::{API_SOURCE, DirectBody, IngestRequest, WEBHOOK_SOURCE, WebhookBody};
use crate::state::SharedState;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct DigestParams {
    pub window: Option<String>,
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_message(err: &Error) -> String {
    match err {
        Error::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Run a read against the store on the blocking pool.
async fn read<F>(state: &SharedState, f: F) -> Result<Vec<Thought>, Error>
where
    F: FnOnce(&thought_db::ThoughtStore) -> thought_common::Result<Vec<Thought>> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| Error::Other(format!("query task failed: {e}")))?
}

fn thoughts_response(result: Result<Vec<Thought>, Error>) -> Response {
    match result {
        Ok(thoughts) => Json(json!({ "thoughts": thoughts })).into_response(),
        Err(e) => {
            warn!("thought query failed: {e}");
            (status_for(&e), Json(json!({ "error": error_message(&e) }))).into_response()
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "thought-system",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// POST /webhooks/ingest — thoughts forwarded by the OpenClaw gateway.
pub async fn webhook_ingest(
    State(state): State<SharedState>,
    body: Result<Json<WebhookBody>, JsonRejection>,
) -> Response {
    let request: IngestRequest = match body {
        Ok(Json(body)) => body.into(),
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "received": true, "error": rejection.body_text() })),
            )
                .into_response();
        }
    };
    debug!(?request, "received ingest webhook");

    match state.pipeline.ingest_blocking(request, WEBHOOK_SOURCE).await {
        Ok(id) => Json(json!({
            "received": true,
            "processed": true,
            "thoughtId": id,
        }))
        .into_response(),
        Err(e) => {
            warn!("webhook ingest error: {e}");
            (
                status_for(&e),
                Json(json!({ "received": true, "error": error_message(&e) })),
            )
                .into_response()
        }
    }
}

/// POST /ingest — direct thought ingestion.
pub async fn direct_ingest(
    State(state): State<SharedState>,
    body: Result<Json<DirectBody>, JsonRejection>,
) -> Response {
    let request: IngestRequest = match body {
        Ok(Json(body)) => body.into(),
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.pipeline.ingest_blocking(request, API_SOURCE).await {
        Ok(id) => Json(json!({ "success": true, "thoughtId": id })).into_response(),
        Err(e) => {
            warn!("ingest error: {e}");
            (status_for(&e), Json(json!({ "error": error_message(&e) }))).into_response()
        }
    }
}

/// GET /thoughts?limit=N — most recent thoughts, newest first.
pub async fn list_thoughts(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit > MAX_LIST_LIMIT {
        let err = Error::Validation(format!("limit must be at most {MAX_LIST_LIMIT}"));
        return (status_for(&err), Json(json!({ "error": error_message(&err) }))).into_response();
    }
    thoughts_response(read(&state, move |store| store.recent(limit)).await)
}

/// GET /thoughts/{id}
pub async fn get_thought(State(state): State<SharedState>, Path(id): Path<i64>) -> Response {
    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || store.get(id))
        .await
        .map_err(|e| Error::Other(format!("query task failed: {e}")))
        .and_then(|found| found)
        .and_then(|thought| thought.ok_or_else(|| Error::NotFound(format!("thought {id}"))));

    match result {
        Ok(thought) => Json(json!({ "thought": thought })).into_response(),
        Err(e) => {
            if !matches!(e, Error::NotFound(_)) {
                warn!("thought lookup failed: {e}");
            }
            (status_for(&e), Json(json!({ "error": error_message(&e) }))).into_response()
        }
    }
}

/// GET /thoughts/search?q=text
pub async fn search_thoughts(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(needle) = params.q.filter(|q| !q.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "query parameter q is required" })),
        )
            .into_response();
    };

    thoughts_response(read(&state, move |store| store.search(&needle)).await)
}

/// GET /thoughts/digest?window=hour|day|<n>m
pub async fn digest_thoughts(
    State(state): State<SharedState>,
    Query(params): Query<DigestParams>,
) -> Response {
    let window = match params
        .window
        .as_deref()
        .unwrap_or("hour")
        .parse::<DigestWindow>()
    {
        Ok(window) => window,
        Err(e) => {
            return (status_for(&e), Json(json!({ "error": error_message(&e) }))).into_response();
        }
    };

    match read(&state, move |store| store.digest_window(window)).await {
        Ok(thoughts) => Json(json!({
            "window": window.to_string(),
            "thoughts": thoughts,
        }))
        .into_response(),
        Err(e) => thoughts_response(Err(e)),
    }
}

/// POST /admin/update — check for a newer revision and update in the background.
pub async fn admin_update(State(state): State<SharedState>) -> Response {
    let check = state.updater.check_for_updates().await;

    if let Some(error) = check.error {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": error })),
        )
            .into_response();
    }

    if !check.has_update {
        return Json(json!({ "success": true, "message": "Already up to date" })).into_response();
    }

    if !state.spawn_update() {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "message": "Update already in progress" })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "message": "Update started",
        "from": check.current,
        "to": check.latest,
    }))
    .into_response()
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

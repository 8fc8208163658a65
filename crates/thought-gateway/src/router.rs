use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/webhooks/ingest", post(api::webhook_ingest))
        .route("/ingest", post(api::direct_ingest))
        .route("/thoughts", get(api::list_thoughts))
        .route("/thoughts/{id}", get(api::get_thought))
        .route("/thoughts/search", get(api::search_thoughts))
        .route("/thoughts/digest", get(api::digest_thoughts))
        .route("/admin/update", post(api::admin_update))
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

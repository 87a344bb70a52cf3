// Presentation layer - HTTP surface
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;

/// Upper bound for an ingested export. A month of minute rows is around 5 MB.
pub const MAX_INGEST_BYTES: usize = 64 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route(
            "/ingest",
            post(handlers::ingest).layer(DefaultBodyLimit::max(MAX_INGEST_BYTES)),
        )
        .route("/stats", get(handlers::range_stats))
        .route("/series", get(handlers::chart_series))
        .route("/series/stream", get(handlers::stream_chart_series))
        .route("/intervals/:subsystem", get(handlers::activity_intervals))
        .route("/daily", get(handlers::list_daily))
        .route("/daily/recompute", post(handlers::recompute_daily))
        .with_state(state)
}

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::collector::Collector;
use crate::handlers;
use crate::middleware::monitor;
use crate::AppState;

/// Builds the full Axum `Router`. With a collector, every request not
/// excluded by it is reported back through the ingest pipeline.
pub fn create_router(state: Arc<AppState>, collector: Option<Collector>) -> Router {
    let router = Router::new()
        // ── Ingestion ───────────────────────────────────────────
        .route("/api/ingest", post(handlers::ingest::ingest))
        // ── Analytics ───────────────────────────────────────────
        .route("/api/usage/summary", get(handlers::usage::summary))
        .route("/api/usage/endpoints", get(handlers::usage::endpoints))
        .route("/api/usage/trends", get(handlers::usage::trends))
        // ── Liveness ────────────────────────────────────────────
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        // ── Provide shared state to all routes above ────────────
        .with_state(state);

    let router = match collector {
        Some(collector) => router.layer(axum_mw::from_fn_with_state(collector, monitor::monitor)),
        None => router,
    };

    // ── Global middleware (applied bottom-up) ───────────────────
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

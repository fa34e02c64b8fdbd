use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::parse_ingest_body;
use crate::AppState;

use super::extract::IngestService;
use super::AppError;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub ingested: usize,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

// ─── POST /api/ingest ────────────────────────────────────────────

/// Validates a collector batch and appends it to the store under the
/// service that owns the API key.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    IngestService(service_id): IngestService,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let normalized = parse_ingest_body(&body).map_err(|e| {
        tracing::info!(%service_id, error = %e, "rejected metrics batch");
        e
    })?;

    let dropped = normalized.warnings.len();
    let ingested = state.store.append(&service_id, normalized.entries).await?;
    tracing::debug!(%service_id, ingested, dropped, "ingested metrics");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            success: true,
            ingested,
            message: "Metrics queued for processing",
            warnings: (!normalized.warnings.is_empty()).then_some(normalized.warnings),
        }),
    ))
}

pub mod extract;
pub mod ingest;
pub mod usage;

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};

use crate::metrics::IngestError;
use crate::store::StoreError;
use crate::usage::QueryError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unauthorized(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            Self::Ingest(IngestError::InvalidPayload(msg)) => {
                (StatusCode::BAD_REQUEST, "Invalid payload", msg, None)
            }
            Self::Ingest(IngestError::EmptyBatch { reasons }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Empty batch",
                "No valid metrics to ingest".to_owned(),
                Some(reasons),
            ),
            Self::Query(e @ QueryError::InvalidTimestamp { .. }) => {
                (StatusCode::BAD_REQUEST, "Invalid query", e.to_string(), None)
            }
            Self::Query(QueryError::Store(e @ StoreError::Encode(_)))
            | Self::Store(e @ StoreError::Encode(_)) => {
                tracing::error!(error = %e, "failed to encode sample");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                    "Metrics could not be stored".to_owned(),
                    None,
                )
            }
            Self::Query(QueryError::Store(e)) | Self::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable",
                    "The metrics store could not be reached".to_owned(),
                    None,
                )
            }
            Self::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg.to_owned(), None)
            }
        };

        let mut body = serde_json::json!({
            "error":   error,
            "message": message,
            "status":  status.as_u16(),
        });
        if let Some(details) = details {
            body["details"] = details.into();
        }

        (status, Json(body)).into_response()
    }
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status":    "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ─── Fallback ────────────────────────────────────────────────────

pub async fn not_found(uri: Uri) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found", "path": uri.path() })),
    )
}

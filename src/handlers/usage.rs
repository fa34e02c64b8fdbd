use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::usage::query::{EndpointPage, SummaryReport, TrendReport};
use crate::usage::{Caller, UsageQuery};
use crate::AppState;

use super::AppError;

// ─── GET /api/usage/summary ──────────────────────────────────────

pub async fn summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<UsageQuery>,
) -> Result<Json<SummaryReport>, AppError> {
    Ok(Json(state.queries().summary(&caller, &query).await?))
}

// ─── GET /api/usage/endpoints ────────────────────────────────────
/// Query: page, limit, sortBy, sortOrder, plus the common range/filter set.

pub async fn endpoints(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<UsageQuery>,
) -> Result<Json<EndpointPage>, AppError> {
    Ok(Json(state.queries().endpoints(&caller, &query).await?))
}

// ─── GET /api/usage/trends ───────────────────────────────────────
/// Query: granularity (`hourly` | `daily`), plus the common range/filter set.

pub async fn trends(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<UsageQuery>,
) -> Result<Json<TrendReport>, AppError> {
    Ok(Json(state.queries().trends(&caller, &query).await?))
}

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{self, EndpointStats, Granularity, Summary, TrendPoint};
use super::visibility::{self, Caller, ScopeFilter};
use crate::metrics::MetricSample;
use crate::registry::Registry;
use crate::store::{Store, StoreError, TimeRange};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid {field} timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Query parameters ────────────────────────────────────────────

/// Raw dashboard query string. Everything stays a string until the
/// individual accessor decides how lenient to be about it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub range: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub service_id: Option<String>,
    pub project_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub granularity: Option<String>,
}

impl UsageQuery {
    pub fn filter(&self) -> ScopeFilter {
        ScopeFilter {
            service_id: self.service_id.clone(),
            project_id: self.project_id.clone(),
        }
    }

    /// An explicit `from`+`to` pair wins; otherwise `range` counts back from
    /// `now` (`24h`, `7d` or `30d`, defaulting to `24h`).
    pub fn time_range(&self, now: DateTime<Utc>) -> Result<TimeRange, QueryError> {
        if let (Some(from), Some(to)) = (self.from.as_deref(), self.to.as_deref()) {
            return Ok(TimeRange::new(
                parse_timestamp("from", from)?,
                parse_timestamp("to", to)?,
            ));
        }

        let lookback = match self.range.as_deref() {
            Some("7d") => Duration::days(7),
            Some("30d") => Duration::days(30),
            _ => Duration::hours(24),
        };
        Ok(TimeRange::new(now - lookback, now))
    }

    pub fn page_request(&self) -> PageRequest {
        let page = self
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .map_or(1, |p| usize::try_from(p).unwrap_or(usize::MAX));

        let limit = match self.limit.as_deref().and_then(|l| l.trim().parse::<i64>().ok()) {
            None | Some(0) => DEFAULT_LIMIT,
            Some(l) => l.clamp(1, MAX_LIMIT as i64) as usize,
        };

        PageRequest {
            page,
            limit,
            sort_by: self
                .sort_by
                .as_deref()
                .and_then(SortKey::parse)
                .unwrap_or_default(),
            order: match self.sort_order.as_deref() {
                Some("asc") => SortOrder::Asc,
                _ => SortOrder::Desc,
            },
        }
    }

    pub fn granularity(&self) -> Granularity {
        Granularity::parse(self.granularity.as_deref())
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, QueryError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| QueryError::InvalidTimestamp {
            field,
            value: raw.to_owned(),
        })
}

// ─── Sorting and pagination ──────────────────────────────────────

/// Columns of the endpoint table that may be sorted on. Unknown names fall
/// back to `requestCount` rather than failing the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    Endpoint,
    Method,
    #[default]
    RequestCount,
    AvgResponseTimeMs,
    MinResponseTimeMs,
    MaxResponseTimeMs,
    LastHit,
    SuccessCount,
    ClientErrorCount,
    ServerErrorCount,
    ErrorRate,
    AvgRequestSize,
    AvgResponseSize,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "endpoint" => SortKey::Endpoint,
            "method" => SortKey::Method,
            "requestCount" => SortKey::RequestCount,
            "avgResponseTimeMs" => SortKey::AvgResponseTimeMs,
            "minResponseTimeMs" => SortKey::MinResponseTimeMs,
            "maxResponseTimeMs" => SortKey::MaxResponseTimeMs,
            "lastHit" => SortKey::LastHit,
            "successCount" => SortKey::SuccessCount,
            "clientErrorCount" => SortKey::ClientErrorCount,
            "serverErrorCount" => SortKey::ServerErrorCount,
            "errorRate" => SortKey::ErrorRate,
            "avgRequestSize" => SortKey::AvgRequestSize,
            "avgResponseSize" => SortKey::AvgResponseSize,
            _ => return None,
        })
    }

    /// Ascending comparison on this column. Missing sizes sort first.
    fn compare(self, a: &EndpointStats, b: &EndpointStats) -> Ordering {
        match self {
            SortKey::Endpoint => a.endpoint.cmp(&b.endpoint),
            SortKey::Method => a.method.as_str().cmp(b.method.as_str()),
            SortKey::RequestCount => a.request_count.cmp(&b.request_count),
            SortKey::AvgResponseTimeMs => a.avg_response_time_ms.cmp(&b.avg_response_time_ms),
            SortKey::MinResponseTimeMs => a.min_response_time_ms.cmp(&b.min_response_time_ms),
            SortKey::MaxResponseTimeMs => a.max_response_time_ms.cmp(&b.max_response_time_ms),
            SortKey::LastHit => a.last_hit.cmp(&b.last_hit),
            SortKey::SuccessCount => a.success_count.cmp(&b.success_count),
            SortKey::ClientErrorCount => a.client_error_count.cmp(&b.client_error_count),
            SortKey::ServerErrorCount => a.server_error_count.cmp(&b.server_error_count),
            SortKey::ErrorRate => a.error_rate.total_cmp(&b.error_rate),
            SortKey::AvgRequestSize => a.avg_request_size.cmp(&b.avg_request_size),
            SortKey::AvgResponseSize => a.avg_response_size.cmp(&b.avg_response_size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub limit: usize,
    pub sort_by: SortKey,
    pub order: SortOrder,
}

/// Sorts the full group set, then cuts out one page. `total` and
/// `total_pages` describe the full set, not the page.
pub fn paginate(mut stats: Vec<EndpointStats>, req: &PageRequest) -> (Vec<EndpointStats>, usize, usize) {
    stats.sort_by(|a, b| {
        let primary = req.sort_by.compare(a, b);
        let primary = match req.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary
            .then_with(|| a.endpoint.cmp(&b.endpoint))
            .then_with(|| a.method.cmp(&b.method))
    });

    let total = stats.len();
    let total_pages = total.div_ceil(req.limit);
    let skip = req.page.saturating_sub(1).saturating_mul(req.limit);
    let window = stats.into_iter().skip(skip).take(req.limit).collect();

    (window, total, total_pages)
}

// ─── Responses ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPage {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub endpoints: Vec<EndpointStats>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub granularity: Granularity,
    pub data: Vec<TrendPoint>,
}

// ─── Façade ──────────────────────────────────────────────────────

/// Runs one analytics request: fresh visibility scope, store scan, view.
pub struct UsageQueries<'a> {
    store: &'a Store,
    registry: &'a dyn Registry,
}

impl<'a> UsageQueries<'a> {
    pub fn new(store: &'a Store, registry: &'a dyn Registry) -> Self {
        Self { store, registry }
    }

    async fn matched(
        &self,
        caller: &Caller,
        query: &UsageQuery,
    ) -> Result<(TimeRange, Vec<MetricSample>), QueryError> {
        let range = query.time_range(Utc::now())?;
        let scope = visibility::resolve(caller, &query.filter(), self.registry);
        let rows = self.store.scan(&range, &scope).await?;

        tracing::debug!(
            identity = %caller.identity,
            scope = scope.kind(),
            from = %range.from,
            to = %range.to,
            rows = rows.len(),
            "matched samples"
        );
        Ok((range, rows))
    }

    pub async fn summary(
        &self,
        caller: &Caller,
        query: &UsageQuery,
    ) -> Result<SummaryReport, QueryError> {
        let (range, rows) = self.matched(caller, query).await?;
        Ok(SummaryReport {
            from: range.from,
            to: range.to,
            summary: aggregate::summarize(&rows),
        })
    }

    pub async fn endpoints(
        &self,
        caller: &Caller,
        query: &UsageQuery,
    ) -> Result<EndpointPage, QueryError> {
        let req = query.page_request();
        let (range, rows) = self.matched(caller, query).await?;
        let (endpoints, total, total_pages) = paginate(aggregate::endpoint_stats(&rows), &req);

        Ok(EndpointPage {
            from: range.from,
            to: range.to,
            endpoints,
            total,
            page: req.page,
            limit: req.limit,
            total_pages,
        })
    }

    pub async fn trends(
        &self,
        caller: &Caller,
        query: &UsageQuery,
    ) -> Result<TrendReport, QueryError> {
        let granularity = query.granularity();
        let (range, rows) = self.matched(caller, query).await?;

        Ok(TrendReport {
            from: range.from,
            to: range.to,
            granularity,
            data: aggregate::trend(&rows, granularity),
        })
    }
}

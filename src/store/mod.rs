//! Append-only time series of metric samples.
//!
//! Two indexes back every backend: one ordered by time across all services,
//! and one ordered by time within each service. `Scope::All` and large
//! service sets walk the former; small sets walk the latter.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::{MetricSample, NormalizedEntry};
use crate::usage::Scope;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Above this many services a scan filters the global time index instead of
/// visiting each per-service index.
pub const SERVICE_SCAN_LIMIT: usize = 64;

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Both bounds floored to whole milliseconds, the resolution samples
    /// are stored at.
    pub fn to_millis(self) -> Self {
        Self::new(floor_millis(self.from), floor_millis(self.to))
    }
}

/// Drops sub-millisecond precision so every backend stores and compares the
/// same instants.
pub fn floor_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] ::redis::RedisError),

    #[error("failed to encode sample: {0}")]
    Encode(#[from] serde_json::Error),
}

// ─── Store ───────────────────────────────────────────────────────

/// Handle to the configured backend. Cheap to clone.
#[derive(Clone)]
pub enum Store {
    Redis(RedisStore),
    Memory(Arc<MemoryStore>),
}

impl Store {
    pub fn memory() -> Self {
        Store::Memory(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Redis(_) => "redis",
            Store::Memory(_) => "memory",
        }
    }

    /// Appends a validated batch for `service_id`, stamped with the server
    /// clock. Returns how many samples were written.
    pub async fn append(
        &self,
        service_id: &str,
        entries: Vec<NormalizedEntry>,
    ) -> Result<usize, StoreError> {
        self.append_at(service_id, entries, Utc::now()).await
    }

    pub async fn append_at(
        &self,
        service_id: &str,
        entries: Vec<NormalizedEntry>,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let timestamp = floor_millis(timestamp);
        let samples: Vec<MetricSample> = entries
            .into_iter()
            .map(|e| e.into_sample(service_id, timestamp))
            .collect();
        let count = samples.len();
        if count == 0 {
            return Ok(0);
        }

        match self {
            Store::Redis(store) => store.append(samples).await?,
            Store::Memory(store) => store.append(samples),
        }

        tracing::debug!(service_id, count, "appended samples");
        Ok(count)
    }

    /// All samples in `range` whose service is admitted by `scope`.
    pub async fn scan(
        &self,
        range: &TimeRange,
        scope: &Scope,
    ) -> Result<Vec<MetricSample>, StoreError> {
        let range = &range.to_millis();
        if matches!(scope, Scope::None) || range.is_empty() {
            return Ok(Vec::new());
        }

        match self {
            Store::Redis(store) => store.scan(range, scope).await,
            Store::Memory(store) => Ok(store.scan(range, scope)),
        }
    }
}

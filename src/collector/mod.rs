//! Client-side collector: buffers per-call measurements and ships them to an
//! ingest endpoint in batches.
//!
//! Every `Collector` owns its queue and flush task, so several can run in
//! one process (e.g. one per monitored API key).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ─── Configuration ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Flush as soon as this many measurements are buffered.
    pub batch_size: usize,
    /// Flush whatever is buffered at this interval.
    pub flush_interval: Duration,
    /// Measurements beyond this many in flight are dropped.
    pub queue_capacity: usize,
    /// Path prefixes that are never recorded.
    pub exclude_paths: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
            queue_capacity: 1024,
            exclude_paths: Vec::new(),
        }
    }
}

// ─── Wire types ──────────────────────────────────────────────────

/// One call as the collector reports it to `/api/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetric {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    /// Milliseconds.
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
}

#[derive(Serialize)]
struct IngestPayload<'a> {
    metrics: &'a [RawMetric],
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("failed to send metrics: {0}")]
    Http(#[from] reqwest::Error),
}

/// Destination of flushed batches.
pub trait MetricSink: Send + Sync + 'static {
    fn send(&self, batch: Vec<RawMetric>) -> impl Future<Output = Result<(), CollectorError>> + Send;
}

/// Posts batches to an ingest server with the service's API key.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpSink {
    /// `base_url` is the server root, e.g. `http://localhost:3001`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/api/ingest", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

impl MetricSink for HttpSink {
    async fn send(&self, batch: Vec<RawMetric>) -> Result<(), CollectorError> {
        self.client
            .post(&self.url)
            .header("X-API-Key", &self.api_key)
            .json(&IngestPayload { metrics: &batch })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ─── Collector handle ────────────────────────────────────────────

/// Cheap, cloneable handle. The flush task stops after the last clone is
/// dropped, sending whatever is still buffered first.
#[derive(Clone)]
pub struct Collector {
    tx: mpsc::Sender<RawMetric>,
    exclude_paths: Arc<[String]>,
}

impl Collector {
    pub fn spawn<S: MetricSink>(sink: S, config: CollectorConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let exclude_paths = Arc::from(config.exclude_paths.clone());
        let handle = tokio::spawn(run(rx, sink, config));
        (Self { tx, exclude_paths }, handle)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Queues one measurement without waiting. Returns `false` when it was
    /// dropped because the queue is full or the flush task has stopped.
    pub fn record(&self, metric: RawMetric) -> bool {
        match self.tx.try_send(metric) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("collector queue full, dropping measurement");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Waits up to `limit` for a flush task to send what is still buffered.
/// The task only finishes once every `Collector` clone has been dropped.
/// Returns `false` when it did not finish in time.
pub async fn drain(flush_task: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, flush_task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "collector flush task failed");
            false
        }
        Err(_) => {
            tracing::warn!(?limit, "timed out draining collector");
            false
        }
    }
}

async fn run<S: MetricSink>(mut rx: mpsc::Receiver<RawMetric>, sink: S, config: CollectorConfig) {
    let batch_size = config.batch_size.max(1);
    let mut buffer = Vec::with_capacity(batch_size);

    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(metric) => {
                    buffer.push(metric);
                    if buffer.len() >= batch_size {
                        flush(&sink, &mut buffer, batch_size).await;
                    }
                }
                None => {
                    flush(&sink, &mut buffer, batch_size).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&sink, &mut buffer, batch_size).await;
                }
            }
        }
    }

    tracing::debug!("collector stopped");
}

/// Sends the buffer in chunks of `batch_size`. Failed chunks are logged and
/// dropped.
async fn flush<S: MetricSink>(sink: &S, buffer: &mut Vec<RawMetric>, batch_size: usize) {
    while !buffer.is_empty() {
        let n = buffer.len().min(batch_size);
        let batch: Vec<RawMetric> = buffer.drain(..n).collect();
        if let Err(e) = sink.send(batch).await {
            tracing::warn!(error = %e, dropped = n, "failed to send metrics");
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod collector;
mod config;
mod handlers;
mod metrics;
mod middleware;
mod redis_client;
mod registry;
mod server;
mod store;
mod usage;

use collector::{Collector, CollectorConfig, HttpSink};
use config::{Config, LogFormat, StoreBackend};
use registry::{Registry, StaticRegistry};
use store::{RedisStore, Store};
use usage::UsageQueries;

/// Upper bound on waiting for the self-monitor's final flush at shutdown.
const FLUSH_ON_SHUTDOWN: Duration = Duration::from_secs(5);

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Time-series backend for ingested samples.
    pub store: Store,

    /// Project/service/API-key lookups.
    pub registry: Arc<dyn Registry>,
}

impl AppState {
    pub fn queries(&self) -> UsageQueries<'_> {
        UsageQueries::new(&self.store, self.registry.as_ref())
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    // ── 1. Registry ──────────────────────────────────────────────
    let registry = StaticRegistry::load(&config.registry_path).with_context(|| {
        format!("loading registry from {}", config.registry_path.display())
    })?;
    tracing::info!(services = registry.service_count(), "registry loaded");

    // ── 2. Store ─────────────────────────────────────────────────
    let store = match config.store_backend {
        StoreBackend::Redis => {
            let conn = redis_client::connect(&config.redis_url)
                .await
                .context("connecting to redis")?;
            Store::Redis(RedisStore::new(conn, config.redis_key_prefix.clone()))
        }
        StoreBackend::Memory => Store::memory(),
    };

    // ── 3. Shared state + optional self-monitoring ───────────────
    let state = Arc::new(AppState {
        store,
        registry: Arc::new(registry),
    });

    let (collector, flush_task) = match &config.self_monitor {
        Some(monitor) => {
            let sink = HttpSink::new(&monitor.url, monitor.api_key.clone());
            let (collector, flush_task) = Collector::spawn(
                sink,
                CollectorConfig {
                    exclude_paths: vec!["/api/ingest".into(), "/health".into()],
                    ..Default::default()
                },
            );
            tracing::info!(url = %monitor.url, "self-monitoring enabled");
            (Some(collector), Some(flush_task))
        }
        None => (None, None),
    };

    let app = server::create_router(Arc::clone(&state), collector);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        backend = state.store.backend(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // The router, and every collector clone with it, is gone once serve
    // returns; the flush task drains what is left and exits.
    if let Some(flush_task) = flush_task {
        if collector::drain(flush_task, FLUSH_ON_SHUTDOWN).await {
            tracing::debug!("self-monitor buffer flushed");
        }
    }

    Ok(())
}

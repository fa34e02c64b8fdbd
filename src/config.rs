//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_KEY_PREFIX: &str = "usage";
pub const DEFAULT_REGISTRY_PATH: &str = "registry.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Reports this server's own traffic to an ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfMonitor {
    pub api_key: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub registry_path: PathBuf,
    pub log_format: LogFormat,
    pub self_monitor: Option<SelfMonitor>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind_addr}"))?;

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("redis") => StoreBackend::Redis,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("STORE_BACKEND must be 'redis' or 'memory', got '{other}'"),
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };

        let self_monitor = var("SELF_MONITOR_API_KEY").map(|api_key| SelfMonitor {
            api_key,
            url: var("SELF_MONITOR_URL").unwrap_or_else(|| format!("http://{bind_addr}")),
        });

        Ok(Self {
            bind_addr,
            store_backend,
            redis_url: var("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_owned()),
            redis_key_prefix: var("REDIS_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_owned()),
            registry_path: var("REGISTRY_PATH")
                .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_owned())
                .into(),
            log_format,
            self_monitor,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3001".parse().unwrap());
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.redis_key_prefix, "usage");
        assert_eq!(config.registry_path, PathBuf::from("registry.json"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.self_monitor.is_none());
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("STORE_BACKEND", "memory"),
            ("LOG_FORMAT", "json"),
            ("REDIS_KEY_PREFIX", "staging"),
            ("SELF_MONITOR_API_KEY", "key-self"),
        ])
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.redis_key_prefix, "staging");
        assert_eq!(
            config.self_monitor,
            Some(SelfMonitor {
                api_key: "key-self".into(),
                url: "http://127.0.0.1:9000".into(),
            })
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("STORE_BACKEND", "  "), ("SELF_MONITOR_API_KEY", "")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert!(config.self_monitor.is_none());
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(load(&[("STORE_BACKEND", "postgres")]).is_err());
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(load(&[("BIND_ADDR", "localhost")]).is_err());
    }
}

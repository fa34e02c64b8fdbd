pub mod normalize;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use normalize::{normalize, parse_ingest_body, IngestError, Normalized};

/// Upper bound on a stored endpoint path, in characters.
pub const ENDPOINT_MAX_LEN: usize = 2048;

/// Ceiling for `requestCount` and the size fields. Larger values are clamped
/// at ingest so that aggregate sums stay far from `u64` overflow.
pub const MAX_COUNTER: u64 = u32::MAX as u64;

// ─── Method ──────────────────────────────────────────────────────

/// HTTP verbs accepted from collectors. Anything else is rejected at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Case-insensitive lookup: `"get"`, `"Get"` and `"GET"` all match.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Samples ─────────────────────────────────────────────────────

/// One validated measurement, before the ingest boundary binds it to a
/// service and the store stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub endpoint: String,
    pub method: Method,
    pub status_code: u16,
    /// Milliseconds, never negative.
    pub response_time: f64,
    /// Always ≥ 1. Values above 1 are pre-aggregated collector buckets.
    pub request_count: u64,
    /// `None` means "not measured", which is different from a zero-byte body.
    pub request_size: Option<u64>,
    pub response_size: Option<u64>,
}

impl NormalizedEntry {
    pub fn into_sample(self, service_id: &str, timestamp: DateTime<Utc>) -> MetricSample {
        MetricSample {
            service_id: service_id.to_owned(),
            endpoint: self.endpoint,
            method: self.method,
            status_code: self.status_code,
            response_time: self.response_time,
            request_count: self.request_count,
            request_size: self.request_size,
            response_size: self.response_size,
            timestamp,
        }
    }
}

/// A persisted row of the time series. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub service_id: String,
    pub endpoint: String,
    pub method: Method,
    pub status_code: u16,
    pub response_time: f64,
    pub request_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_ignores_case() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("Options"), Some(Method::Options));
        assert_eq!(Method::parse("TRACE"), None);
        assert_eq!(Method::parse(""), None);
    }

    #[test]
    fn sample_serializes_without_unmeasured_sizes() {
        let sample = NormalizedEntry {
            endpoint: "/a".into(),
            method: Method::Get,
            status_code: 200,
            response_time: 12.5,
            request_count: 1,
            request_size: None,
            response_size: Some(0),
        }
        .into_sample("svc", DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap());

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["serviceId"], "svc");
        assert_eq!(json["method"], "GET");
        assert!(json.get("requestSize").is_none());
        assert_eq!(json["responseSize"], 0);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }
}

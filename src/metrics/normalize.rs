//! Validation of untrusted metric batches submitted by collectors.
//!
//! Entries are checked one at a time. A bad entry is dropped and its index
//! and cause are kept as a warning; only a structurally wrong body or a batch
//! with nothing usable fails as a whole.

use serde_json::Value;

use super::{Method, NormalizedEntry, ENDPOINT_MAX_LEN, MAX_COUNTER};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("no valid metrics to ingest")]
    EmptyBatch { reasons: Vec<String> },
}

/// Output of a successful normalization pass.
#[derive(Debug, Default)]
pub struct Normalized {
    pub entries: Vec<NormalizedEntry>,
    /// One line per dropped entry, e.g. `Metric at index 3: ...`.
    pub warnings: Vec<String>,
}

/// Parses a raw ingest body (`{ "metrics": [...] }`) and normalizes it.
pub fn parse_ingest_body(body: &[u8]) -> Result<Normalized, IngestError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| IngestError::InvalidPayload(format!("body is not valid JSON: {e}")))?;

    normalize(value.get("metrics"))
}

/// Validates every entry of `batch` independently.
pub fn normalize(batch: Option<&Value>) -> Result<Normalized, IngestError> {
    let Some(Value::Array(raw)) = batch else {
        return Err(IngestError::InvalidPayload(
            "request body must contain a \"metrics\" array".into(),
        ));
    };

    let mut out = Normalized {
        entries: Vec::with_capacity(raw.len()),
        warnings: Vec::new(),
    };

    for (idx, entry) in raw.iter().enumerate() {
        match normalize_entry(entry) {
            Ok(entry) => out.entries.push(entry),
            Err(cause) => out.warnings.push(format!("Metric at index {idx}: {cause}")),
        }
    }

    if out.entries.is_empty() {
        return Err(IngestError::EmptyBatch {
            reasons: out.warnings,
        });
    }

    Ok(out)
}

fn normalize_entry(entry: &Value) -> Result<NormalizedEntry, &'static str> {
    if !entry.is_object() {
        return Err("must be an object");
    }

    let endpoint = match entry.get("endpoint").and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().chars().take(ENDPOINT_MAX_LEN).collect::<String>()
        }
        _ => return Err("endpoint is required and must be a non-empty string"),
    };

    let method = entry
        .get("method")
        .and_then(Value::as_str)
        .and_then(Method::parse)
        .ok_or("method must be one of GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS")?;

    let status_code = match entry.get("statusCode").and_then(Value::as_f64) {
        Some(n) if n.fract() == 0.0 && (100.0..=599.0).contains(&n) => n as u16,
        _ => return Err("statusCode must be a valid HTTP status (100-599)"),
    };

    let response_time = match entry.get("responseTime").and_then(Value::as_f64) {
        Some(n) if n >= 0.0 => n,
        _ => return Err("responseTime must be a non-negative number"),
    };

    let request_size = optional_size(entry, "requestSize")
        .map_err(|_| "requestSize must be a non-negative number")?;
    let response_size = optional_size(entry, "responseSize")
        .map_err(|_| "responseSize must be a non-negative number")?;

    // Anything that is not a positive number counts as a single call.
    let request_count = match entry.get("requestCount").and_then(Value::as_f64) {
        Some(n) if n > 0.0 => clamp_counter(n).max(1),
        _ => 1,
    };

    Ok(NormalizedEntry {
        endpoint,
        method,
        status_code,
        response_time,
        request_count,
        request_size,
        response_size,
    })
}

fn clamp_counter(n: f64) -> u64 {
    (n.round() as u64).min(MAX_COUNTER)
}

fn optional_size(entry: &Value, field: &str) -> Result<Option<u64>, ()> {
    match entry.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_f64() {
            Some(n) if n >= 0.0 => Ok(Some(clamp_counter(n))),
            _ => Err(()),
        },
    }
}

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::collector::{Collector, RawMetric};

/// Measures every request that passes through and hands the result to the
/// collector:
///
///   endpoint       path only, never the query string
///   responseTime   wall time around the inner service, in ms
///   request/responseSize  `Content-Length` when known, else left out
pub async fn monitor(State(collector): State<Collector>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    if collector.is_excluded(&path) {
        return next.run(req).await;
    }

    let method = req.method().as_str().to_owned();
    let request_size = content_length(req.headers());

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let response_size =
        content_length(response.headers()).or_else(|| response.body().size_hint().exact());
    let status = response.status().as_u16();

    tracing::trace!(%method, %path, status, elapsed_us = elapsed.as_micros() as u64, "monitored request");

    collector.record(RawMetric {
        endpoint: path,
        method,
        status_code: status,
        response_time: elapsed.as_secs_f64() * 1000.0,
        request_size,
        response_size,
    });

    response
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

//! The three read-only views over a set of matched samples.
//!
//! Response-time averages are plain per-row means: a pre-aggregated row with
//! `requestCount = 50` weighs the same as a single call. Size averages, on
//! the other hand, are weighted by `requestCount`. Both behaviours are
//! deliberate and covered by tests below.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::{Method, MetricSample};

fn round_ms(v: f64) -> u64 {
    v.round() as u64
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// ─── Summary ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_requests: u64,
    pub error_count: u64,
    /// Percentage with two decimals; exactly 0 when there is no traffic.
    pub error_rate: f64,
    pub avg_response_time_ms: u64,
}

pub fn summarize(samples: &[MetricSample]) -> Summary {
    let mut total_requests = 0u64;
    let mut error_count = 0u64;
    let mut response_sum = 0f64;

    for s in samples {
        total_requests = total_requests.saturating_add(s.request_count);
        if s.is_error() {
            error_count = error_count.saturating_add(s.request_count);
        }
        response_sum += s.response_time;
    }

    let avg = if samples.is_empty() {
        0
    } else {
        round_ms(response_sum / samples.len() as f64)
    };

    Summary {
        total_requests,
        error_count,
        error_rate: (percent(error_count, total_requests) * 100.0).round() / 100.0,
        avg_response_time_ms: avg,
    }
}

// ─── Per-endpoint table ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint: String,
    pub method: Method,
    pub request_count: u64,
    pub avg_response_time_ms: u64,
    pub min_response_time_ms: u64,
    pub max_response_time_ms: u64,
    pub last_hit: DateTime<Utc>,
    pub success_count: u64,
    pub client_error_count: u64,
    pub server_error_count: u64,
    pub error_rate: f64,
    /// `None` (JSON `null`) when no row in the group measured it.
    pub avg_request_size: Option<u64>,
    pub avg_response_size: Option<u64>,
}

/// Count-weighted mean over the rows where a size was measured.
#[derive(Default)]
struct SizeAcc {
    weighted_sum: u128,
    weight: u128,
}

impl SizeAcc {
    fn add(&mut self, size: Option<u64>, count: u64) {
        if let Some(size) = size {
            self.weighted_sum = self
                .weighted_sum
                .saturating_add(u128::from(size) * u128::from(count));
            self.weight = self.weight.saturating_add(u128::from(count));
        }
    }

    fn mean(&self) -> Option<u64> {
        (self.weight > 0).then(|| (self.weighted_sum as f64 / self.weight as f64).round() as u64)
    }
}

struct GroupAcc {
    request_count: u64,
    rows: u64,
    response_sum: f64,
    response_min: f64,
    response_max: f64,
    last_hit: DateTime<Utc>,
    success: u64,
    client_errors: u64,
    server_errors: u64,
    request_size: SizeAcc,
    response_size: SizeAcc,
}

impl GroupAcc {
    fn new(first: &MetricSample) -> Self {
        Self {
            request_count: 0,
            rows: 0,
            response_sum: 0.0,
            response_min: first.response_time,
            response_max: first.response_time,
            last_hit: first.timestamp,
            success: 0,
            client_errors: 0,
            server_errors: 0,
            request_size: SizeAcc::default(),
            response_size: SizeAcc::default(),
        }
    }

    fn add(&mut self, s: &MetricSample) {
        let n = s.request_count;
        self.request_count = self.request_count.saturating_add(n);
        self.rows += 1;
        self.response_sum += s.response_time;
        self.response_min = self.response_min.min(s.response_time);
        self.response_max = self.response_max.max(s.response_time);
        self.last_hit = self.last_hit.max(s.timestamp);

        match s.status_code {
            200..=299 => self.success = self.success.saturating_add(n),
            400..=499 => self.client_errors = self.client_errors.saturating_add(n),
            500..=u16::MAX => self.server_errors = self.server_errors.saturating_add(n),
            _ => {}
        }

        self.request_size.add(s.request_size, n);
        self.response_size.add(s.response_size, n);
    }

    fn finish(self, endpoint: String, method: Method) -> EndpointStats {
        EndpointStats {
            endpoint,
            method,
            request_count: self.request_count,
            avg_response_time_ms: round_ms(self.response_sum / self.rows as f64),
            min_response_time_ms: round_ms(self.response_min),
            max_response_time_ms: round_ms(self.response_max),
            last_hit: self.last_hit,
            success_count: self.success,
            client_error_count: self.client_errors,
            server_error_count: self.server_errors,
            error_rate: percent(
                self.client_errors.saturating_add(self.server_errors),
                self.request_count,
            ),
            avg_request_size: self.request_size.mean(),
            avg_response_size: self.response_size.mean(),
        }
    }
}

/// One row per `(endpoint, method)`, ordered by that pair.
pub fn endpoint_stats(samples: &[MetricSample]) -> Vec<EndpointStats> {
    let mut groups: BTreeMap<(&str, Method), GroupAcc> = BTreeMap::new();

    for s in samples {
        groups
            .entry((s.endpoint.as_str(), s.method))
            .or_insert_with(|| GroupAcc::new(s))
            .add(s);
    }

    groups
        .into_iter()
        .map(|((endpoint, method), acc)| acc.finish(endpoint.to_owned(), method))
        .collect()
}

// ─── Trend series ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Hourly,
    Daily,
}

impl Granularity {
    /// `daily` selects days; anything else falls back to hours.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("daily") => Granularity::Daily,
            _ => Granularity::Hourly,
        }
    }

    /// UTC bucket label: `2024-05-01T13:00:00.000Z` or `2024-05-01`.
    pub fn bucket(self, ts: DateTime<Utc>) -> String {
        match self {
            Granularity::Hourly => ts.format("%Y-%m-%dT%H:00:00.000Z").to_string(),
            Granularity::Daily => ts.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Bucket label, see [`Granularity::bucket`].
    pub timestamp: String,
    pub request_count: u64,
    pub avg_response_time_ms: u64,
    pub error_count: u64,
}

#[derive(Default)]
struct BucketAcc {
    request_count: u64,
    rows: u64,
    response_sum: f64,
    error_count: u64,
}

/// Buckets with data only, ascending. Empty periods are left as gaps.
pub fn trend(samples: &[MetricSample], granularity: Granularity) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<String, BucketAcc> = BTreeMap::new();

    for s in samples {
        let acc = buckets.entry(granularity.bucket(s.timestamp)).or_default();
        acc.request_count = acc.request_count.saturating_add(s.request_count);
        acc.rows += 1;
        acc.response_sum += s.response_time;
        if s.is_error() {
            acc.error_count = acc.error_count.saturating_add(s.request_count);
        }
    }

    buckets
        .into_iter()
        .map(|(timestamp, acc)| TrendPoint {
            timestamp,
            request_count: acc.request_count,
            avg_response_time_ms: round_ms(acc.response_sum / acc.rows as f64),
            error_count: acc.error_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 15, 0).unwrap()
    }

    fn row(endpoint: &str, method: Method, status: u16, time: f64) -> MetricSample {
        MetricSample {
            service_id: "S1".into(),
            endpoint: endpoint.into(),
            method,
            status_code: status,
            response_time: time,
            request_count: 1,
            request_size: None,
            response_size: None,
            timestamp: at(1, 10),
        }
    }

    #[test]
    fn summary_of_one_success_one_failure() {
        let rows = vec![
            row("/a", Method::Get, 200, 10.0),
            row("/a", Method::Get, 500, 30.0),
        ];
        let s = summarize(&rows);
        assert_eq!(s.total_requests, 2);
        assert_eq!(s.error_count, 1);
        assert_eq!(s.error_rate, 50.0);
        assert_eq!(s.avg_response_time_ms, 20);
    }

    #[test]
    fn summary_without_traffic_is_all_zero() {
        let s = summarize(&[]);
        assert_eq!(
            s,
            Summary {
                total_requests: 0,
                error_count: 0,
                error_rate: 0.0,
                avg_response_time_ms: 0,
            }
        );
    }

    #[test]
    fn summary_error_rate_has_two_decimals() {
        let mut rows = vec![row("/a", Method::Get, 404, 1.0)];
        rows.extend((0..2).map(|_| row("/a", Method::Get, 200, 1.0)));
        assert_eq!(summarize(&rows).error_rate, 33.33);
    }

    #[test]
    fn summary_counts_weighted_by_request_count() {
        let mut bulk = row("/a", Method::Get, 503, 100.0);
        bulk.request_count = 9;
        let rows = vec![bulk, row("/a", Method::Get, 200, 0.0)];
        let s = summarize(&rows);
        assert_eq!(s.total_requests, 10);
        assert_eq!(s.error_count, 9);
        assert_eq!(s.error_rate, 90.0);
        // per-row mean, not request-weighted: (100 + 0) / 2
        assert_eq!(s.avg_response_time_ms, 50);
    }

    #[test]
    fn endpoint_view_for_concrete_scenario() {
        let rows = vec![
            row("/a", Method::Get, 200, 10.0),
            row("/a", Method::Get, 500, 30.0),
        ];
        let stats = endpoint_stats(&rows);
        assert_eq!(stats.len(), 1);
        let a = &stats[0];
        assert_eq!(a.endpoint, "/a");
        assert_eq!(a.method, Method::Get);
        assert_eq!(a.request_count, 2);
        assert_eq!(a.success_count, 1);
        assert_eq!(a.server_error_count, 1);
        assert_eq!(a.client_error_count, 0);
        assert_eq!(a.error_rate, 50.0);
        assert_eq!(a.avg_response_time_ms, 20);
        assert_eq!(a.min_response_time_ms, 10);
        assert_eq!(a.max_response_time_ms, 30);
    }

    #[test]
    fn endpoint_groups_split_by_method_and_track_last_hit() {
        let mut late = row("/a", Method::Get, 302, 4.4);
        late.timestamp = at(2, 8);
        let rows = vec![
            row("/a", Method::Post, 201, 1.0),
            late,
            row("/a", Method::Get, 404, 5.6),
            row("/b", Method::Get, 200, 1.0),
        ];
        let stats = endpoint_stats(&rows);
        let keys: Vec<(&str, Method)> = stats.iter().map(|s| (s.endpoint.as_str(), s.method)).collect();
        assert_eq!(keys, vec![("/a", Method::Get), ("/a", Method::Post), ("/b", Method::Get)]);

        let get_a = &stats[0];
        assert_eq!(get_a.last_hit, at(2, 8));
        // 3xx is neither success nor error
        assert_eq!(get_a.success_count, 0);
        assert_eq!(get_a.client_error_count, 1);
        assert_eq!(get_a.error_rate, 50.0);
        assert_eq!(get_a.min_response_time_ms, 4);
        assert_eq!(get_a.max_response_time_ms, 6);
    }

    #[test]
    fn sizes_are_null_when_never_measured() {
        let stats = endpoint_stats(&[row("/a", Method::Get, 200, 1.0)]);
        assert_eq!(stats[0].avg_request_size, None);
        assert_eq!(stats[0].avg_response_size, None);

        let json = serde_json::to_value(&stats[0]).unwrap();
        assert!(json["avgRequestSize"].is_null());
    }

    #[test]
    fn sizes_are_count_weighted_and_skip_missing_rows() {
        let mut big = row("/a", Method::Get, 200, 1.0);
        big.request_size = Some(100);
        big.request_count = 3;
        let mut small = row("/a", Method::Get, 200, 1.0);
        small.request_size = Some(0);
        small.response_size = Some(0);
        let unmeasured = row("/a", Method::Get, 200, 1.0);

        let stats = endpoint_stats(&[big, small, unmeasured]);
        // (100*3 + 0*1) / 4, the unmeasured row is not averaged in as zero
        assert_eq!(stats[0].avg_request_size, Some(75));
        assert_eq!(stats[0].avg_response_size, Some(0));
    }

    #[test]
    fn response_time_average_is_per_row_unlike_sizes() {
        let mut bulk = row("/a", Method::Get, 200, 90.0);
        bulk.request_count = 99;
        bulk.request_size = Some(10);
        let mut single = row("/a", Method::Get, 200, 10.0);
        single.request_size = Some(110);

        let stats = endpoint_stats(&[bulk, single]);
        assert_eq!(stats[0].avg_response_time_ms, 50);
        assert_eq!(stats[0].avg_request_size, Some(11));
    }

    #[test]
    fn bucket_labels() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Granularity::Hourly.bucket(ts), "2024-01-02T03:00:00.000Z");
        assert_eq!(Granularity::Daily.bucket(ts), "2024-01-02");
        assert_eq!(Granularity::parse(Some("daily")), Granularity::Daily);
        assert_eq!(Granularity::parse(Some("weekly")), Granularity::Hourly);
        assert_eq!(Granularity::parse(None), Granularity::Hourly);
    }

    #[test]
    fn daily_trend_leaves_gaps() {
        let mut rows = Vec::new();
        for (day, status) in [(1, 200), (1, 500), (3, 200)] {
            let mut r = row("/a", Method::Get, status, 10.0);
            r.timestamp = at(day, 12);
            rows.push(r);
        }
        let points = trend(&rows, Granularity::Daily);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, "2024-05-01");
        assert_eq!(points[0].request_count, 2);
        assert_eq!(points[0].error_count, 1);
        assert_eq!(points[1].timestamp, "2024-05-03");
        assert_eq!(points[1].error_count, 0);
    }

    #[test]
    fn hourly_trend_is_sorted_ascending() {
        let mut rows = Vec::new();
        for hour in [15, 3, 9, 3] {
            let mut r = row("/a", Method::Get, 200, hour as f64);
            r.timestamp = at(1, hour);
            rows.push(r);
        }
        let labels: Vec<String> = trend(&rows, Granularity::Hourly)
            .into_iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(
            labels,
            vec![
                "2024-05-01T03:00:00.000Z",
                "2024-05-01T09:00:00.000Z",
                "2024-05-01T15:00:00.000Z"
            ]
        );
    }

    #[test]
    fn views_are_repeatable() {
        let rows: Vec<MetricSample> = (0..50)
            .map(|i| row(&format!("/e{}", i % 7), Method::Get, 200 + (i % 4) * 100, i as f64 * 1.7))
            .collect();
        assert_eq!(summarize(&rows), summarize(&rows));
        assert_eq!(endpoint_stats(&rows), endpoint_stats(&rows));
        assert_eq!(trend(&rows, Granularity::Hourly), trend(&rows, Granularity::Hourly));
    }

    #[test]
    fn oversized_counters_cannot_overflow_any_view() {
        use crate::metrics::{normalize, MAX_COUNTER};

        let huge = serde_json::json!({
            "endpoint": "/flood",
            "method": "POST",
            "statusCode": 503,
            "responseTime": 1,
            "requestCount": 1e19,
            "requestSize": 1e19,
            "responseSize": 1e30,
        });
        let batch = serde_json::json!([huge.clone(), huge]);
        let rows: Vec<MetricSample> = normalize(Some(&batch))
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.into_sample("S1", at(1, 10)))
            .collect();
        assert!(rows.iter().all(|r| r.request_count == MAX_COUNTER));
        assert!(rows.iter().all(|r| r.request_size == Some(MAX_COUNTER)));

        let s = summarize(&rows);
        assert_eq!(s.total_requests, 2 * MAX_COUNTER);
        assert_eq!(s.error_count, 2 * MAX_COUNTER);
        assert_eq!(s.error_rate, 100.0);

        let stats = endpoint_stats(&rows);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].server_error_count, 2 * MAX_COUNTER);
        assert_eq!(stats[0].avg_request_size, Some(MAX_COUNTER));
        assert_eq!(stats[0].avg_response_size, Some(MAX_COUNTER));

        let points = trend(&rows, Granularity::Daily);
        assert_eq!(points[0].request_count, 2 * MAX_COUNTER);
        assert_eq!(points[0].error_count, 2 * MAX_COUNTER);
    }

    #[test]
    fn accumulators_saturate_instead_of_wrapping() {
        let mut a = row("/a", Method::Get, 500, 1.0);
        a.request_count = u64::MAX;
        a.request_size = Some(u64::MAX);
        let rows = vec![a.clone(), a];

        assert_eq!(summarize(&rows).total_requests, u64::MAX);
        let stats = endpoint_stats(&rows);
        assert_eq!(stats[0].request_count, u64::MAX);
        assert!(stats[0].avg_request_size.is_some());
        assert_eq!(trend(&rows, Granularity::Hourly)[0].error_count, u64::MAX);
    }
}

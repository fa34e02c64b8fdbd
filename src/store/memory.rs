use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{TimeRange, SERVICE_SCAN_LIMIT};
use crate::metrics::MetricSample;
use crate::usage::Scope;

/// `(timestamp, insertion sequence)`: unique, and ordered by time first.
type Key = (DateTime<Utc>, u64);
type Index = BTreeMap<Key, Arc<MetricSample>>;

/// Rows visited per read-lock acquisition during a scan.
const SCAN_CHUNK: usize = 1024;

/// In-process backend. Samples are shared between the two indexes.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    by_time: Index,
    by_service: HashMap<String, Index>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().by_time.len()
    }

    pub fn append(&self, samples: Vec<MetricSample>) {
        let mut inner = self.inner.write();
        for sample in samples {
            let key = (sample.timestamp, inner.next_seq);
            inner.next_seq += 1;

            let sample = Arc::new(sample);
            inner
                .by_service
                .entry(sample.service_id.clone())
                .or_default()
                .insert(key, sample.clone());
            inner.by_time.insert(key, sample);
        }
    }

    pub fn scan(&self, range: &TimeRange, scope: &Scope) -> Vec<MetricSample> {
        if range.is_empty() {
            return Vec::new();
        }

        let hits = match scope {
            Scope::None => Vec::new(),
            Scope::Only(ids) if ids.len() <= SERVICE_SCAN_LIMIT => ids
                .iter()
                .flat_map(|id| self.scan_index(Some(id.as_str()), range, scope))
                .collect(),
            _ => self.scan_index(None, range, scope),
        };

        hits.iter().map(|s| (**s).clone()).collect()
    }

    /// Walks one index in chunks of `SCAN_CHUNK`, taking the read lock once
    /// per chunk so appends interleave with long scans.
    fn scan_index(
        &self,
        service_id: Option<&str>,
        range: &TimeRange,
        scope: &Scope,
    ) -> Vec<Arc<MetricSample>> {
        let upper = Bound::Included((range.to, u64::MAX));
        let mut lower = Bound::Included((range.from, 0));
        let mut hits = Vec::new();

        loop {
            let inner = self.inner.read();
            let index = match service_id {
                Some(id) => match inner.by_service.get(id) {
                    Some(index) => index,
                    None => break,
                },
                None => &inner.by_time,
            };

            let mut last = None;
            let mut taken = 0;
            for (key, sample) in index.range((lower, upper)).take(SCAN_CHUNK) {
                last = Some(*key);
                taken += 1;
                if scope.admits(&sample.service_id) {
                    hits.push(Arc::clone(sample));
                }
            }
            drop(inner);

            match last {
                Some(key) if taken == SCAN_CHUNK => lower = Bound::Excluded(key),
                _ => break,
            }
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;
    use crate::metrics::Method;

    fn sample(service: &str, ts: DateTime<Utc>) -> MetricSample {
        MetricSample {
            service_id: service.into(),
            endpoint: "/a".into(),
            method: Method::Get,
            status_code: 200,
            response_time: 1.0,
            request_count: 1,
            request_size: None,
            response_size: None,
            timestamp: ts,
        }
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        store.append(vec![
            sample("s1", t0 - Duration::seconds(1)),
            sample("s1", t0),
            sample("s1", t0 + Duration::seconds(10)),
            sample("s1", t0 + Duration::seconds(11)),
        ]);
        let range = TimeRange::new(t0, t0 + Duration::seconds(10));
        assert_eq!(store.scan(&range, &Scope::All).len(), 2);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn identical_samples_are_kept() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        store.append(vec![sample("s1", t0), sample("s1", t0)]);
        assert_eq!(store.scan(&TimeRange::new(t0, t0), &Scope::All).len(), 2);
    }

    #[test]
    fn service_index_and_time_index_agree() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        for i in 0..100 {
            store.append(vec![sample(&format!("s{}", i % 10), t0 + Duration::seconds(i))]);
        }
        let range = TimeRange::new(t0, t0 + Duration::seconds(100));

        let small: BTreeSet<String> = ["s1", "s2", "missing"].iter().map(|s| s.to_string()).collect();
        assert_eq!(store.scan(&range, &Scope::Only(small)).len(), 20);

        // Larger than the per-service cutoff, so the time index is filtered.
        let large: BTreeSet<String> = (0..SERVICE_SCAN_LIMIT + 10)
            .map(|i| format!("s{i}"))
            .collect();
        assert_eq!(store.scan(&range, &Scope::Only(large)).len(), 100);
    }

    #[test]
    fn scans_cross_chunk_boundaries_without_loss() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        // Many rows share one timestamp so chunks split inside a tie.
        let rows: Vec<MetricSample> = (0..SCAN_CHUNK * 2 + 7)
            .map(|i| sample(if i % 2 == 0 { "s1" } else { "s2" }, t0 + Duration::seconds((i / 500) as i64)))
            .collect();
        store.append(rows);

        let range = TimeRange::new(t0, t0 + Duration::hours(1));
        let all = store.scan(&range, &Scope::All);
        assert_eq!(all.len(), SCAN_CHUNK * 2 + 7);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let only = Scope::Only(BTreeSet::from(["s2".to_string()]));
        assert_eq!(store.scan(&range, &only).len(), SCAN_CHUNK + 3);
    }

    #[test]
    fn appends_proceed_between_scan_chunks() {
        let store = Arc::new(MemoryStore::new());
        let t0 = Utc::now();
        store.append((0..SCAN_CHUNK * 4).map(|_| sample("s1", t0)).collect());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.append(vec![sample("s2", t0 + Duration::seconds(5))]);
                }
            })
        };
        let range = TimeRange::new(t0, t0 + Duration::seconds(10));
        let seen = store.scan(&range, &Scope::All).len();
        writer.join().unwrap();

        assert!((SCAN_CHUNK * 4..=SCAN_CHUNK * 4 + 50).contains(&seen));
        assert_eq!(store.scan(&range, &Scope::All).len(), SCAN_CHUNK * 4 + 50);
    }
}

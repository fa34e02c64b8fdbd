use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StoreError, TimeRange, SERVICE_SCAN_LIMIT};
use crate::metrics::MetricSample;
use crate::usage::Scope;

/// Redis-backed series.
///
/// Layout (scores are epoch milliseconds):
///
///   `<prefix>:samples`          ZSET of every sample
///   `<prefix>:svc:<serviceId>`  ZSET of one service's samples
///
/// Members are JSON records carrying a random id, so two identical
/// measurements taken in the same millisecond stay distinct.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    id: Uuid,
    sample: &'a MetricSample,
}

/// Read side of [`RecordRef`]; the id only matters for uniqueness.
#[derive(Deserialize)]
struct Record {
    sample: MetricSample,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn time_key(&self) -> String {
        format!("{}:samples", self.prefix)
    }

    fn service_key(&self, service_id: &str) -> String {
        format!("{}:svc:{}", self.prefix, service_id)
    }

    /// Writes the whole batch to both indexes in one MULTI/EXEC.
    pub async fn append(&self, samples: Vec<MetricSample>) -> Result<(), StoreError> {
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        for sample in &samples {
            let member = serde_json::to_string(&RecordRef {
                id: Uuid::new_v4(),
                sample,
            })?;
            let score = sample.timestamp.timestamp_millis();
            pipe.zadd(self.time_key(), &member, score).ignore();
            pipe.zadd(self.service_key(&sample.service_id), &member, score)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn scan(
        &self,
        range: &TimeRange,
        scope: &Scope,
    ) -> Result<Vec<MetricSample>, StoreError> {
        let min = range.from.timestamp_millis();
        let max = range.to.timestamp_millis();
        let mut conn = self.conn.clone();

        let members: Vec<String> = match scope {
            Scope::None => return Ok(Vec::new()),
            Scope::Only(ids) if ids.len() <= SERVICE_SCAN_LIMIT => {
                let mut pipe = ::redis::pipe();
                for id in ids {
                    pipe.zrangebyscore(self.service_key(id), min, max);
                }
                let per_service: Vec<Vec<String>> = pipe.query_async(&mut conn).await?;
                per_service.into_iter().flatten().collect()
            }
            _ => conn.zrangebyscore(self.time_key(), min, max).await?,
        };

        Ok(decode_members(members, scope))
    }
}

fn decode_members(members: Vec<String>, scope: &Scope) -> Vec<MetricSample> {
    members
        .into_iter()
        .filter_map(|member| match serde_json::from_str::<Record>(&member) {
            Ok(record) => Some(record.sample),
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable sample");
                None
            }
        })
        .filter(|sample| scope.admits(&sample.service_id))
        .collect()
}

// Stats repository: ingest writer plus counter, ranking and memory-series
// query engines over the ordered KV store. Holds no mutable state of its own;
// cross-bucket consistency rides on the store's atomic batch.

pub mod window;

use crate::error::{StatsError, StoreError};
use crate::keys::{self, RankingKind, Resolution};
use crate::kv_store::{Batch, BatchReply, KvStore};
use crate::models::{CounterPoint, MemoryPoint, MemorySample, RankingEntry};
use chrono::{Days, NaiveDateTime, NaiveTime, TimeDelta};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::instrument;

pub const DEFAULT_TOP_LIMIT: u32 = 10;

/// Per-process sequence for scratch union sets, so concurrent ranking
/// queries sharing one store never collide on the scratch name.
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

fn scratch_key() -> String {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("_top_counts:{}:{}", std::process::id(), seq)
}

pub struct StatsRepo {
    store: KvStore,
}

impl StatsRepo {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Append one used/peak memory sample, scored by its timestamp.
    #[instrument(skip(self), fields(repo = "stats", operation = "record_memory_sample"))]
    pub async fn record_memory_sample(
        &self,
        server: &str,
        timestamp: NaiveDateTime,
        used: u64,
        peak: u64,
    ) -> Result<(), StatsError> {
        let key = keys::memory_key(server);
        let sample = MemorySample {
            timestamp: keys::epoch(timestamp),
            used,
            peak,
        };
        let member = serde_json::to_string(&sample).map_err(|e| StatsError::Decode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.zadd(&key, sample.timestamp, &member).await?;
        Ok(())
    }

    /// Overwrite the server's latest info snapshot. Last write wins; no
    /// history is kept.
    pub async fn record_info_snapshot(
        &self,
        server: &str,
        _timestamp: NaiveDateTime,
        info: &serde_json::Value,
    ) -> Result<(), StatsError> {
        let key = keys::info_key(server);
        let payload = serde_json::to_string(info).map_err(|e| StatsError::Decode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.set(&key, &payload).await?;
        Ok(())
    }

    /// Record one observed command invocation: the per-second and per-day
    /// ranking sets for both kinds, plus all four counter resolutions, in a
    /// single all-or-nothing batch. A failed batch leaves no counter changed
    /// and is not retried here.
    #[instrument(skip(self), fields(repo = "stats", operation = "record_event"))]
    pub async fn record_event(
        &self,
        server: &str,
        timestamp: NaiveDateTime,
        command: &str,
        key_name: &str,
    ) -> Result<(), StatsError> {
        let epoch = keys::epoch(timestamp);
        let date = timestamp.date();

        let mut batch = Batch::new();
        batch.zincrby(
            keys::second_ranking_key(server, RankingKind::Commands, epoch),
            command,
            1.0,
        );
        batch.zincrby(
            keys::daily_ranking_key(server, RankingKind::Commands, date),
            command,
            1.0,
        );
        batch.zincrby(
            keys::second_ranking_key(server, RankingKind::Keys, epoch),
            key_name,
            1.0,
        );
        // The daily key rollup counts the command name, not the key. Deployed
        // collectors have always written it this way; readers of the
        // DailyKeyCount sets expect that shape. See DESIGN.md.
        batch.zincrby(
            keys::daily_ranking_key(server, RankingKind::Keys, date),
            command,
            1.0,
        );
        for resolution in [
            Resolution::Second,
            Resolution::Minute,
            Resolution::Hour,
            Resolution::Day,
        ] {
            batch.hincrby(
                resolution.counter_key(server),
                resolution.counter_field(timestamp),
                1,
            );
        }

        if let Err(e) = self.store.exec(batch).await {
            tracing::warn!(error = %e, server, "event batch aborted, no counters written");
            return Err(e.into());
        }
        Ok(())
    }

    /// Latest info snapshot. A server with no snapshot yet is a typed
    /// not-found, distinct from a present-but-empty snapshot.
    pub async fn get_latest_info(&self, server: &str) -> Result<serde_json::Value, StatsError> {
        let key = keys::info_key(server);
        let Some(raw) = self.store.get(&key).await? else {
            return Err(StatsError::InfoNotFound {
                server: server.to_string(),
            });
        };
        serde_json::from_str(&raw).map_err(|e| StatsError::Decode {
            key,
            reason: e.to_string(),
        })
    }

    /// Memory samples in [from, to], ascending by sample time. A malformed
    /// stored sample fails the query with a decode error; it is never
    /// coerced or skipped.
    #[instrument(skip(self), fields(repo = "stats", operation = "query_memory_series"))]
    pub async fn query_memory_series(
        &self,
        server: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<MemoryPoint>, StatsError> {
        let key = keys::memory_key(server);
        let rows = self
            .store
            .zrange_by_score(&key, keys::epoch(from), keys::epoch(to))
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for raw in rows {
            let sample: MemorySample =
                serde_json::from_str(&raw).map_err(|e| StatsError::Decode {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            out.push(MemoryPoint {
                timestamp: Resolution::Second.bucket_label(keys::from_epoch(sample.timestamp)),
                peak: sample.peak,
                used: sample.used,
            });
        }
        Ok(out)
    }

    /// Command throughput per bucket over [from, to] at the requested
    /// resolution, most recent bucket first. Buckets nobody wrote (or whose
    /// stored value does not parse) count as zero. `to < from` yields an
    /// empty series.
    #[instrument(skip(self), fields(repo = "stats", operation = "query_counts"))]
    pub async fn query_counts(
        &self,
        server: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        resolution: Resolution,
    ) -> Result<Vec<CounterPoint>, StatsError> {
        if to < from {
            return Ok(Vec::new());
        }

        let (fields, stamps) = enumerate_buckets(from, to, resolution);
        let counts = self
            .store
            .hmget(&resolution.counter_key(server), &fields)
            .await?;

        let mut out = Vec::with_capacity(counts.len());
        for (raw, ts) in counts.into_iter().zip(stamps) {
            let count = raw
                .as_deref()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            out.push(CounterPoint {
                count,
                timestamp: resolution.bucket_label(ts),
            });
        }
        out.reverse();
        Ok(out)
    }

    /// Top commands over [from, to]. Output order is ascending by score, the
    /// shape existing consumers of this feed were built against.
    pub async fn query_top_commands(
        &self,
        server: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<RankingEntry>, StatsError> {
        let mut entries = self
            .top_counts(server, RankingKind::Commands, from, to, limit)
            .await?;
        entries.reverse();
        Ok(entries)
    }

    /// Top keys over [from, to], descending by score.
    pub async fn query_top_keys(
        &self,
        server: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<RankingEntry>, StatsError> {
        self.top_counts(server, RankingKind::Keys, from, to, limit)
            .await
    }

    /// Union-merge every ranking set the window decomposes into, read the
    /// top `limit` members by descending score, and drop the scratch set,
    /// all in one batch so the scratch is never visible elsewhere.
    #[instrument(skip(self), fields(repo = "stats", operation = "top_counts"))]
    async fn top_counts(
        &self,
        server: &str,
        kind: RankingKind,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<RankingEntry>, StatsError> {
        let sets = window::ranking_set_keys(server, kind, from, to);
        if sets.is_empty() {
            return Ok(Vec::new());
        }

        let scratch = scratch_key();
        let mut batch = Batch::new();
        batch.zunionstore(scratch.as_str(), sets);
        batch.zrevrange_with_scores(scratch.as_str(), limit);
        batch.del(scratch.as_str());

        let mut replies = self.store.exec(batch).await?;
        let result = match replies.drain(..).nth(1) {
            Some(BatchReply::Members(members)) => Ok(members
                .into_iter()
                .map(|(member, score)| RankingEntry { member, score })
                .collect()),
            other => Err(StoreError::BatchReply(format!(
                "expected members at position 1, got {other:?}"
            ))
            .into()),
        };
        result
    }
}

/// Every bucket field covering [from, to] at the given resolution, inclusive
/// on both ends, with the timestamp each field maps back to.
fn enumerate_buckets(
    from: NaiveDateTime,
    to: NaiveDateTime,
    resolution: Resolution,
) -> (Vec<String>, Vec<NaiveDateTime>) {
    let mut fields = Vec::new();
    let mut stamps = Vec::new();

    match resolution {
        Resolution::Day => {
            let mut day = from.date();
            while day <= to.date() {
                let ts = day.and_time(NaiveTime::MIN);
                fields.push(resolution.counter_field(ts));
                stamps.push(ts);
                day = day + Days::new(1);
            }
        }
        Resolution::Hour | Resolution::Minute => {
            let step = if resolution == Resolution::Hour {
                TimeDelta::hours(1)
            } else {
                TimeDelta::minutes(1)
            };
            let mut t = from;
            while t <= to {
                fields.push(resolution.counter_field(t));
                stamps.push(t);
                t += step;
            }
        }
        Resolution::Second => {
            for x in keys::epoch(from)..=keys::epoch(to) {
                fields.push(x.to_string());
                stamps.push(keys::from_epoch(x));
            }
        }
    }

    (fields, stamps)
}

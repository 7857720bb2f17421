// Domain models shared by the ingest writer and the query engines

use serde::{Deserialize, Serialize};

/// One memory poll, stored verbatim as a score-ordered set member.
/// Append-only: never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySample {
    /// Seconds since epoch, also the member's score.
    pub timestamp: i64,
    pub used: u64,
    pub peak: u64,
}

/// One row of a memory-series query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryPoint {
    /// `%Y-%m-%d %H:%M:%S` formatted sample time.
    pub timestamp: String,
    pub peak: u64,
    pub used: u64,
}

/// One bucket of a counter query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterPoint {
    pub count: i64,
    /// Bucket label formatted per the query resolution.
    pub timestamp: String,
}

/// One entry of a top-N ranking result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub member: String,
    pub score: f64,
}

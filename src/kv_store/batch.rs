// Typed batch builder. Accumulates ops and commits them as one unit via
// KvStore::exec; replies come back positionally, one per op.

#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Add `delta` to a sorted-set member's score, creating it at `delta`.
    ZIncrBy {
        key: String,
        member: String,
        delta: f64,
    },
    /// Add `delta` to an integer hash field, creating it at `delta`.
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    /// Overwrite `dest` with the member-wise score sum of `sources`.
    ZUnionStore { dest: String, sources: Vec<String> },
    /// Top `limit` members by descending score (ties: member ascending).
    ZRevRangeWithScores { key: String, limit: u32 },
    /// Remove a key and everything stored under it.
    Del { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchReply {
    /// New score after ZIncrBy.
    Score(f64),
    /// New value after HIncrBy, cardinality after ZUnionStore, rows after Del.
    Int(i64),
    /// (member, score) pairs from ZRevRangeWithScores.
    Members(Vec<(String, f64)>),
}

#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub(crate) ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn zincrby(&mut self, key: impl Into<String>, member: impl Into<String>, delta: f64) {
        self.ops.push(BatchOp::ZIncrBy {
            key: key.into(),
            member: member.into(),
            delta,
        });
    }

    pub fn hincrby(&mut self, key: impl Into<String>, field: impl Into<String>, delta: i64) {
        self.ops.push(BatchOp::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        });
    }

    pub fn zunionstore(&mut self, dest: impl Into<String>, sources: Vec<String>) {
        self.ops.push(BatchOp::ZUnionStore {
            dest: dest.into(),
            sources,
        });
    }

    pub fn zrevrange_with_scores(&mut self, key: impl Into<String>, limit: u32) {
        self.ops.push(BatchOp::ZRevRangeWithScores {
            key: key.into(),
            limit,
        });
    }

    pub fn del(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Del { key: key.into() });
    }
}

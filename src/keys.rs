// Time-bucket key scheme. Pure functions shared by the ingest writer and the
// query engines so both sides always agree on bucket identity.
//
// All keys are namespaced by server id; dates use the compact %y%m%d form and
// hour/minute fields are unpadded decimal (wire-compatible with the stored
// data of earlier collectors).

use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Granularity of time bucketing for counter queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Second,
    Minute,
    Hour,
    Day,
}

/// Which ranking family a top-N query reads: per-command or per-key counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingKind {
    Commands,
    Keys,
}

impl RankingKind {
    /// Key-family name for the per-second sorted sets.
    pub fn second_family(self) -> &'static str {
        match self {
            RankingKind::Commands => "CommandCount",
            RankingKind::Keys => "KeyCount",
        }
    }

    /// Key-family name for the per-day rollup sorted sets.
    pub fn day_family(self) -> &'static str {
        match self {
            RankingKind::Commands => "DailyCommandCount",
            RankingKind::Keys => "DailyKeyCount",
        }
    }
}

/// Timestamps are timezone-naive; epoch conversion treats them as UTC on both
/// the write and read path, so bucket identity never shifts.
pub fn epoch(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

pub fn from_epoch(epoch: i64) -> NaiveDateTime {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

pub fn bucket_date(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

pub fn memory_key(server: &str) -> String {
    format!("{server}:memory")
}

pub fn info_key(server: &str) -> String {
    format!("{server}:Info")
}

pub fn second_ranking_key(server: &str, kind: RankingKind, epoch: i64) -> String {
    format!("{server}:{}:{epoch}", kind.second_family())
}

pub fn daily_ranking_key(server: &str, kind: RankingKind, date: NaiveDate) -> String {
    format!("{server}:{}:{}", kind.day_family(), bucket_date(date))
}

impl Resolution {
    /// Hash key holding every bucket of this resolution for one server.
    pub fn counter_key(self, server: &str) -> String {
        let suffix = match self {
            Resolution::Second => "CommandCountBySecond",
            Resolution::Minute => "CommandCountByMinute",
            Resolution::Hour => "CommandCountByHour",
            Resolution::Day => "CommandCountByDay",
        };
        format!("{server}:{suffix}")
    }

    /// Hash field identifying the bucket `ts` falls into.
    pub fn counter_field(self, ts: NaiveDateTime) -> String {
        match self {
            Resolution::Second => epoch(ts).to_string(),
            Resolution::Minute => {
                format!("{}:{}:{}", ts.format("%y%m%d"), ts.hour(), ts.minute())
            }
            Resolution::Hour => format!("{}:{}", ts.format("%y%m%d"), ts.hour()),
            Resolution::Day => ts.format("%y%m%d").to_string(),
        }
    }

    /// Human-readable bucket label used in query results.
    pub fn bucket_label(self, ts: NaiveDateTime) -> String {
        let fmt = match self {
            Resolution::Second => "%Y-%m-%d %H:%M:%S",
            Resolution::Minute => "%Y-%m-%d %H:%M:00",
            Resolution::Hour => "%Y-%m-%d %H:00:00",
            Resolution::Day => "%Y-%m-%d",
        };
        ts.format(fmt).to_string()
    }
}

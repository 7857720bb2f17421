// Window decomposition for top-N ranking queries: pure key enumeration.
// Repo access (union, range, delete) stays in stats_repo::mod.

use crate::keys::{self, RankingKind};
use chrono::{Days, NaiveDateTime, NaiveTime};

/// How wide a window may be before the decomposition switches from
/// all-seconds to boundary-seconds plus interior per-day rollups.
const MAX_SECONDS_SPAN_DAYS: i64 = 2;

/// Every ranking set contributing to `[from, to]` for one server and kind,
/// in chronological order.
///
/// A window spanning at most two calendar days is covered by its per-second
/// sets alone. Wider windows use per-second sets for the remainder of
/// `from`'s day, one per-day rollup set for each full day strictly between,
/// and per-second sets from `to`'s midnight onwards, so the cost is bounded
/// by two days of seconds plus one set per interior day.
pub fn ranking_set_keys(
    server: &str,
    kind: RankingKind,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Vec<String> {
    if to < from {
        return Vec::new();
    }

    let start = keys::epoch(from);
    let end = keys::epoch(to);
    let days_span = (to.date() - from.date()).num_days();

    let mut sets = Vec::new();
    if days_span > MAX_SECONDS_SPAN_DAYS {
        let next_day = from.date() + Days::new(1);
        let prev_day = to.date() - Days::new(1);
        let from_day_end = keys::epoch(next_day.and_time(NaiveTime::MIN)) - 1;
        let to_day_begin = keys::epoch(to.date().and_time(NaiveTime::MIN));

        for x in start..=from_day_end {
            sets.push(keys::second_ranking_key(server, kind, x));
        }
        let mut day = next_day;
        while day <= prev_day {
            sets.push(keys::daily_ranking_key(server, kind, day));
            day = day + Days::new(1);
        }
        for x in to_day_begin..=end {
            sets.push(keys::second_ranking_key(server, kind, x));
        }
    } else {
        for x in start..=end {
            sets.push(keys::second_ranking_key(server, kind, x));
        }
    }
    sets
}

// Ranking tests: window decomposition and top-N queries

mod common;

use common::{repo_in, ts};
use statstore::keys::{self, RankingKind};
use statstore::kv_store::{Batch, BatchReply};
use statstore::stats_repo::{DEFAULT_TOP_LIMIT, StatsRepo, window};
use tempfile::TempDir;

/// Read a whole sorted set, descending by score.
async fn zset(repo: &StatsRepo, key: &str) -> Vec<(String, f64)> {
    let mut batch = Batch::new();
    batch.zrevrange_with_scores(key, 100);
    match repo.store().exec(batch).await.unwrap().remove(0) {
        BatchReply::Members(members) => members,
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn top_keys_descending_top_commands_ascending() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let t = ts("2025-01-05 07:05:09");

    repo.record_event("srv1", t, "GET", "k1").await.unwrap();
    repo.record_event("srv1", t, "GET", "k2").await.unwrap();
    repo.record_event("srv1", t, "SET", "k1").await.unwrap();

    let top_keys = repo
        .query_top_keys("srv1", t, t, DEFAULT_TOP_LIMIT)
        .await
        .unwrap();
    assert_eq!(top_keys.len(), 2);
    assert_eq!((top_keys[0].member.as_str(), top_keys[0].score), ("k1", 2.0));
    assert_eq!((top_keys[1].member.as_str(), top_keys[1].score), ("k2", 1.0));

    // Commands come back ascending; consumers of this feed reverse it.
    let top_commands = repo.query_top_commands("srv1", t, t, 10).await.unwrap();
    assert_eq!(top_commands.len(), 2);
    assert_eq!(
        (top_commands[0].member.as_str(), top_commands[0].score),
        ("SET", 1.0)
    );
    assert_eq!(
        (top_commands[1].member.as_str(), top_commands[1].score),
        ("GET", 2.0)
    );
}

#[tokio::test]
async fn daily_key_rollup_counts_commands_not_keys() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let t = ts("2025-01-05 07:05:09");

    repo.record_event("srv1", t, "GET", "k1").await.unwrap();
    repo.record_event("srv1", t, "GET", "k2").await.unwrap();
    repo.record_event("srv1", t, "SET", "k1").await.unwrap();

    // The daily key-count rollup is scored by command name; the per-second
    // sets hold the actual key names.
    let daily = zset(
        &repo,
        &keys::daily_ranking_key("srv1", RankingKind::Keys, t.date()),
    )
    .await;
    assert_eq!(
        daily,
        vec![("GET".to_string(), 2.0), ("SET".to_string(), 1.0)]
    );

    let per_second = zset(
        &repo,
        &keys::second_ranking_key("srv1", RankingKind::Keys, keys::epoch(t)),
    )
    .await;
    assert_eq!(
        per_second,
        vec![("k1".to_string(), 2.0), ("k2".to_string(), 1.0)]
    );
}

#[tokio::test]
async fn per_second_command_scores_sum_to_daily_rollup() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let stamps = [
        ts("2025-01-05 07:05:09"),
        ts("2025-01-05 09:30:00"),
        ts("2025-01-05 23:59:59"),
    ];

    for t in stamps {
        repo.record_event("srv1", t, "GET", "k1").await.unwrap();
    }

    let daily = zset(
        &repo,
        &keys::daily_ranking_key("srv1", RankingKind::Commands, stamps[0].date()),
    )
    .await;
    assert_eq!(daily, vec![("GET".to_string(), 3.0)]);

    for t in stamps {
        let per_second = zset(
            &repo,
            &keys::second_ranking_key("srv1", RankingKind::Commands, keys::epoch(t)),
        )
        .await;
        assert_eq!(per_second, vec![("GET".to_string(), 1.0)]);
    }
}

#[tokio::test]
async fn whole_window_equals_merged_subwindows() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;

    repo.record_event("srv1", ts("2025-01-05 07:00:00"), "GET", "k1")
        .await
        .unwrap();
    repo.record_event("srv1", ts("2025-01-05 07:00:30"), "GET", "k1")
        .await
        .unwrap();
    repo.record_event("srv1", ts("2025-01-05 07:01:10"), "SET", "k2")
        .await
        .unwrap();

    let whole = repo
        .query_top_keys("srv1", ts("2025-01-05 07:00:00"), ts("2025-01-05 07:02:00"), 10)
        .await
        .unwrap();

    let first = repo
        .query_top_keys("srv1", ts("2025-01-05 07:00:00"), ts("2025-01-05 07:00:59"), 10)
        .await
        .unwrap();
    let second = repo
        .query_top_keys("srv1", ts("2025-01-05 07:01:00"), ts("2025-01-05 07:02:00"), 10)
        .await
        .unwrap();

    let mut merged: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for entry in first.into_iter().chain(second) {
        *merged.entry(entry.member).or_default() += entry.score;
    }
    for entry in &whole {
        assert_eq!(merged.get(&entry.member), Some(&entry.score));
    }
    assert_eq!(whole.len(), merged.len());
}

#[tokio::test]
async fn wide_window_interior_day_equals_narrow_query() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let noon = ts("2025-03-03 12:00:00");

    repo.record_event("srv1", noon, "GET", "k1").await.unwrap();
    repo.record_event("srv1", noon, "GET", "k1").await.unwrap();
    repo.record_event("srv1", noon, "SET", "k2").await.unwrap();

    // Five calendar days: only day 3 has events, served by its daily rollup.
    let wide = repo
        .query_top_commands(
            "srv1",
            ts("2025-03-01 23:59:50"),
            ts("2025-03-05 00:00:05"),
            10,
        )
        .await
        .unwrap();
    // Narrow same-day window, served by per-second sets.
    let narrow = repo
        .query_top_commands("srv1", ts("2025-03-03 11:59:00"), ts("2025-03-03 12:01:00"), 10)
        .await
        .unwrap();

    assert_eq!(wide, narrow);
    assert_eq!(wide.len(), 2);
    assert_eq!((wide[0].member.as_str(), wide[0].score), ("SET", 1.0));
    assert_eq!((wide[1].member.as_str(), wide[1].score), ("GET", 2.0));
}

#[tokio::test]
async fn boundary_days_are_not_double_counted() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;

    repo.record_event("srv1", ts("2025-03-01 23:59:55"), "GET", "k1")
        .await
        .unwrap();
    repo.record_event("srv1", ts("2025-03-03 12:00:00"), "GET", "k1")
        .await
        .unwrap();
    repo.record_event("srv1", ts("2025-03-05 00:00:02"), "GET", "k1")
        .await
        .unwrap();

    let top = repo
        .query_top_commands(
            "srv1",
            ts("2025-03-01 23:59:50"),
            ts("2025-03-05 00:00:05"),
            10,
        )
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!((top[0].member.as_str(), top[0].score), ("GET", 3.0));
}

#[tokio::test]
async fn top_n_limit_truncates() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let t = ts("2025-01-05 07:05:09");

    for (key, hits) in [("k1", 3), ("k2", 2), ("k3", 1)] {
        for _ in 0..hits {
            repo.record_event("srv1", t, "GET", key).await.unwrap();
        }
    }

    let top = repo.query_top_keys("srv1", t, t, 2).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!((top[0].member.as_str(), top[0].score), ("k1", 3.0));
    assert_eq!((top[1].member.as_str(), top[1].score), ("k2", 2.0));
}

#[tokio::test]
async fn ranking_inverted_range_is_empty() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;

    let top = repo
        .query_top_keys(
            "srv1",
            ts("2025-01-05 08:00:00"),
            ts("2025-01-05 07:00:00"),
            10,
        )
        .await
        .unwrap();
    assert!(top.is_empty());
}

#[tokio::test]
async fn concurrent_ranking_queries_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let repo = repo_in(&dir).await;
    let t = ts("2025-01-05 07:05:09");

    repo.record_event("srv1", t, "GET", "k1").await.unwrap();
    repo.record_event("srv1", t, "SET", "k2").await.unwrap();

    let (a, b) = tokio::join!(
        repo.query_top_keys("srv1", t, t, 10),
        repo.query_top_keys("srv1", t, t, 10)
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 2);
}

#[test]
fn window_narrow_span_is_all_seconds() {
    let from = ts("2025-01-05 07:00:00");
    let to = ts("2025-01-05 07:00:04");
    let sets = window::ranking_set_keys("srv1", RankingKind::Commands, from, to);
    assert_eq!(sets.len(), 5);
    assert_eq!(sets[0], format!("srv1:CommandCount:{}", keys::epoch(from)));
    assert_eq!(sets[4], format!("srv1:CommandCount:{}", keys::epoch(to)));
}

#[test]
fn window_two_day_span_still_all_seconds() {
    let from = ts("2025-01-05 23:59:59");
    let to = ts("2025-01-07 00:00:00");
    let sets = window::ranking_set_keys("srv1", RankingKind::Keys, from, to);
    let expected = (keys::epoch(to) - keys::epoch(from) + 1) as usize;
    assert_eq!(sets.len(), expected);
    assert!(sets.iter().all(|k| k.starts_with("srv1:KeyCount:")));
}

#[test]
fn window_wide_span_uses_daily_rollups_between_boundary_seconds() {
    let from = ts("2025-03-01 23:59:50");
    let to = ts("2025-03-05 00:00:05");
    let sets = window::ranking_set_keys("srv1", RankingKind::Commands, from, to);

    // 10 trailing seconds of day 1, 3 interior daily sets, 6 leading seconds
    // of day 5.
    assert_eq!(sets.len(), 10 + 3 + 6);
    assert_eq!(sets[0], format!("srv1:CommandCount:{}", keys::epoch(from)));
    assert_eq!(sets[10], "srv1:DailyCommandCount:250302");
    assert_eq!(sets[11], "srv1:DailyCommandCount:250303");
    assert_eq!(sets[12], "srv1:DailyCommandCount:250304");
    assert_eq!(sets[13], format!("srv1:CommandCount:{}", keys::epoch(ts("2025-03-05 00:00:00"))));
    assert_eq!(sets[18], format!("srv1:CommandCount:{}", keys::epoch(to)));
}

#[test]
fn window_inverted_range_is_empty() {
    let sets = window::ranking_set_keys(
        "srv1",
        RankingKind::Commands,
        ts("2025-01-05 08:00:00"),
        ts("2025-01-05 07:00:00"),
    );
    assert!(sets.is_empty());
}

// Shared test helpers

use chrono::NaiveDateTime;
use statstore::kv_store::KvStore;
use statstore::stats_repo::StatsRepo;
use tempfile::TempDir;

#[allow(dead_code)]
pub async fn repo_in(dir: &TempDir) -> StatsRepo {
    let path = dir.path().join("stats.db");
    let store = KvStore::connect(path.to_str().unwrap(), 5).await.unwrap();
    store.init().await.unwrap();
    StatsRepo::new(store)
}

#[allow(dead_code)]
pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

// SQLite-backed ordered key-value store. Sorted sets, integer hashes and
// plain strings, each namespaced by key; batches run inside one transaction
// so a failed batch is never partially visible.

mod batch;

pub use batch::{Batch, BatchOp, BatchReply};

use crate::error::StoreError;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Max bound parameters per statement; IN-lists are chunked to stay under
/// SQLite's variable limit.
const IN_CHUNK: usize = 500;

pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Sqlx(sqlx::Error::Io(e)))?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS zsets (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                score REAL NOT NULL,
                PRIMARY KEY (key, member)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_zsets_key_score ON zsets(key, score)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hashes (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS strings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Add a member with the given score; same member under the same key is
    /// overwritten (score-ordered set semantics).
    #[instrument(skip(self, member), fields(repo = "kv_store", operation = "zadd"))]
    pub async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO zsets (key, member, score) VALUES ($1, $2, $3)
             ON CONFLICT(key, member) DO UPDATE SET score = excluded.score",
        )
        .bind(key)
        .bind(member)
        .bind(score as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Members with min <= score <= max, ascending by score then member.
    #[instrument(skip(self), fields(repo = "kv_store", operation = "zrange_by_score"))]
    pub async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT member FROM zsets WHERE key = $1 AND score >= $2 AND score <= $3
             ORDER BY score ASC, member ASC",
        )
        .bind(key)
        .bind(min as f64)
        .bind(max as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get("member")?);
        }
        Ok(out)
    }

    /// Last-write-wins string value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO strings (key, value) VALUES ($1, $2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM strings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row.try_get("value")?))
    }

    /// Hash fields read positionally: the result aligns with `fields`, with
    /// `None` for absent fields.
    #[instrument(skip(self, fields), fields(repo = "kv_store", operation = "hmget", field_count = fields.len()))]
    pub async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let mut found: HashMap<String, String> = HashMap::with_capacity(fields.len());
        for chunk in fields.chunks(IN_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("${}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT field, value FROM hashes WHERE key = $1 AND field IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(key);
            for field in chunk {
                query = query.bind(field);
            }
            for row in query.fetch_all(&self.pool).await? {
                found.insert(row.try_get("field")?, row.try_get("value")?);
            }
        }
        Ok(fields.iter().map(|f| found.get(f).cloned()).collect())
    }

    /// Run every op of the batch inside one transaction, in submission order.
    /// Any failure rolls the whole batch back; nothing is partially visible.
    #[instrument(skip(self, batch), fields(repo = "kv_store", operation = "exec", ops = batch.len()))]
    pub async fn exec(&self, batch: Batch) -> Result<Vec<BatchReply>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut replies = Vec::with_capacity(batch.len());

        for op in batch.ops {
            match op {
                BatchOp::ZIncrBy { key, member, delta } => {
                    let score: f64 = sqlx::query_scalar(
                        "INSERT INTO zsets (key, member, score) VALUES ($1, $2, $3)
                         ON CONFLICT(key, member) DO UPDATE SET score = score + excluded.score
                         RETURNING score",
                    )
                    .bind(&key)
                    .bind(&member)
                    .bind(delta)
                    .fetch_one(&mut *tx)
                    .await?;
                    replies.push(BatchReply::Score(score));
                }
                BatchOp::HIncrBy { key, field, delta } => {
                    let value: i64 = sqlx::query_scalar(
                        "INSERT INTO hashes (key, field, value) VALUES ($1, $2, $3)
                         ON CONFLICT(key, field) DO UPDATE
                             SET value = CAST(value AS INTEGER) + CAST(excluded.value AS INTEGER)
                         RETURNING CAST(value AS INTEGER)",
                    )
                    .bind(&key)
                    .bind(&field)
                    .bind(delta)
                    .fetch_one(&mut *tx)
                    .await?;
                    replies.push(BatchReply::Int(value));
                }
                BatchOp::ZUnionStore { dest, sources } => {
                    sqlx::query("DELETE FROM zsets WHERE key = $1")
                        .bind(&dest)
                        .execute(&mut *tx)
                        .await?;
                    for chunk in sources.chunks(IN_CHUNK) {
                        let placeholders = (0..chunk.len())
                            .map(|i| format!("${}", i + 2))
                            .collect::<Vec<_>>()
                            .join(", ");
                        let sql = format!(
                            "INSERT INTO zsets (key, member, score)
                             SELECT $1, member, SUM(score) FROM zsets
                             WHERE key IN ({placeholders}) GROUP BY member
                             ON CONFLICT(key, member) DO UPDATE SET score = score + excluded.score"
                        );
                        let mut query = sqlx::query(&sql).bind(&dest);
                        for source in chunk {
                            query = query.bind(source);
                        }
                        query.execute(&mut *tx).await?;
                    }
                    let cardinality: i64 =
                        sqlx::query_scalar("SELECT COUNT(*) FROM zsets WHERE key = $1")
                            .bind(&dest)
                            .fetch_one(&mut *tx)
                            .await?;
                    replies.push(BatchReply::Int(cardinality));
                }
                BatchOp::ZRevRangeWithScores { key, limit } => {
                    let rows = sqlx::query(
                        "SELECT member, score FROM zsets WHERE key = $1
                         ORDER BY score DESC, member ASC LIMIT $2",
                    )
                    .bind(&key)
                    .bind(limit as i64)
                    .fetch_all(&mut *tx)
                    .await?;
                    let mut members = Vec::with_capacity(rows.len());
                    for row in rows {
                        members.push((row.try_get("member")?, row.try_get("score")?));
                    }
                    replies.push(BatchReply::Members(members));
                }
                BatchOp::Del { key } => {
                    let mut removed: u64 = 0;
                    for table in ["zsets", "hashes", "strings"] {
                        let r = sqlx::query(&format!("DELETE FROM {table} WHERE key = $1"))
                            .bind(&key)
                            .execute(&mut *tx)
                            .await?;
                        removed += r.rows_affected();
                    }
                    replies.push(BatchReply::Int(removed as i64));
                }
            }
        }

        tx.commit().await?;
        Ok(replies)
    }
}

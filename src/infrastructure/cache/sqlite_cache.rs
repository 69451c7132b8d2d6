use crate::application::ports::cache_store::CacheStore;
use crate::domain::entities::offline::{CacheCounters, CacheEntry, CacheUsage};
use crate::domain::value_objects::CacheKey;
use crate::infrastructure::offline::mappers::{domain_cache_entry_from_row, tags_to_json, to_json};
use crate::infrastructure::offline::rows::CacheEntryRow;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

const STAT_HIT_COUNT: &str = "hit_count";
const STAT_MISS_COUNT: &str = "miss_count";
const STAT_LAST_CLEANUP: &str = "last_cleanup";

/// SQLite に永続化するキャッシュストア
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
}

impl SqliteCacheStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT key, data, timestamp, expires_at, tags, size, access_count, last_accessed
            FROM cache_entries
            WHERE key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(domain_cache_entry_from_row).transpose()
    }

    async fn put_entry(&self, entry: &CacheEntry) -> Result<(), AppError> {
        let data = to_json(&entry.data)?;
        let tags = tags_to_json(&entry.tags)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (
                key, data, timestamp, expires_at, tags, size, access_count, last_accessed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                timestamp = excluded.timestamp,
                expires_at = excluded.expires_at,
                tags = excluded.tags,
                size = excluded.size,
                access_count = excluded.access_count,
                last_accessed = excluded.last_accessed
            "#,
        )
        .bind(entry.key.as_str())
        .bind(&data)
        .bind(entry.timestamp.timestamp_millis())
        .bind(entry.expires_at.map(|at| at.timestamp_millis()))
        .bind(&tags)
        .bind(i64::try_from(entry.size).unwrap_or(i64::MAX))
        .bind(i64::try_from(entry.access_count).unwrap_or(i64::MAX))
        .bind(entry.last_accessed.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE cache_entries SET access_count = access_count + 1, last_accessed = ?1 \
             WHERE key = ?2",
        )
        .bind(now.timestamp_millis())
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_entry(&self, key: &CacheKey) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<u64, AppError> {
        if tags.is_empty() {
            return Ok(0);
        }
        let requested = serde_json::to_string(tags)?;

        let result = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE EXISTS (
                SELECT 1
                FROM json_each(cache_entries.tags) AS entry_tag
                JOIN json_each(?1) AS requested_tag
                  ON entry_tag.value = requested_tag.value
            )
            "#,
        )
        .bind(&requested)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_entries(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at < ?1",
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn usage(&self) -> Result<CacheUsage, AppError> {
        let (entries, total_size): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size), 0) FROM cache_entries")
                .fetch_one(&self.pool)
                .await?;

        Ok(CacheUsage {
            entries: u64::try_from(entries).unwrap_or(0),
            total_size: u64::try_from(total_size).unwrap_or(0),
        })
    }

    async fn least_recently_accessed(&self, limit: u64) -> Result<Vec<CacheKey>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM cache_entries ORDER BY last_accessed ASC, key ASC LIMIT ?1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(key,)| CacheKey::new(key).map_err(AppError::ValidationError))
            .collect()
    }

    async fn delete_entries(&self, keys: &[CacheKey]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;

        for key in keys {
            let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn load_counters(&self) -> Result<CacheCounters, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT key, value FROM cache_stats")
            .fetch_all(&self.pool)
            .await?;

        let mut counters = CacheCounters::default();
        for (key, value) in rows {
            match key.as_str() {
                STAT_HIT_COUNT => counters.hit_count = u64::try_from(value).unwrap_or(0),
                STAT_MISS_COUNT => counters.miss_count = u64::try_from(value).unwrap_or(0),
                STAT_LAST_CLEANUP => counters.last_cleanup = Some(value),
                _ => {}
            }
        }
        Ok(counters)
    }

    async fn save_counters(&self, counters: &CacheCounters) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let mut values = vec![
            (STAT_HIT_COUNT, i64::try_from(counters.hit_count).unwrap_or(i64::MAX)),
            (STAT_MISS_COUNT, i64::try_from(counters.miss_count).unwrap_or(i64::MAX)),
        ];
        if let Some(last_cleanup) = counters.last_cleanup {
            values.push((STAT_LAST_CLEANUP, last_cleanup));
        }

        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO cache_stats (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

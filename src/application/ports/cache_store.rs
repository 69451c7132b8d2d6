use crate::domain::entities::offline::{CacheCounters, CacheEntry, CacheUsage};
use crate::domain::value_objects::CacheKey;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// キャッシュエントリの保存先
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError>;
    async fn put_entry(&self, entry: &CacheEntry) -> Result<(), AppError>;
    /// アクセス回数を加算し最終アクセス時刻を更新
    async fn touch_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<(), AppError>;
    async fn delete_entry(&self, key: &CacheKey) -> Result<bool, AppError>;
    async fn delete_by_tags(&self, tags: &[String]) -> Result<u64, AppError>;
    async fn clear_entries(&self) -> Result<u64, AppError>;
    /// `expires_at < now` のエントリを削除
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
    async fn usage(&self) -> Result<CacheUsage, AppError>;
    async fn least_recently_accessed(&self, limit: u64) -> Result<Vec<CacheKey>, AppError>;
    async fn delete_entries(&self, keys: &[CacheKey]) -> Result<u64, AppError>;
    async fn load_counters(&self) -> Result<CacheCounters, AppError>;
    async fn save_counters(&self, counters: &CacheCounters) -> Result<(), AppError>;
}

use crate::application::ports::cache_store::CacheStore;
use crate::domain::entities::offline::{CacheCounters, CacheEntry, CacheUsage};
use crate::domain::value_objects::CacheKey;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// メモリ上のキャッシュストア（プロセス終了で消える）
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    counters: Arc<RwLock<CacheCounters>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャッシュサイズを取得
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn put_entry(&self, entry: &CacheEntry) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.key.as_str().to_string(), entry.clone());
        Ok(())
    }

    async fn touch_entry(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key.as_str()) {
            entry.access_count += 1;
            entry.last_accessed = now;
        }
        Ok(())
    }

    async fn delete_entry(&self, key: &CacheKey) -> Result<bool, AppError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key.as_str()).is_some())
    }

    async fn delete_by_tags(&self, tags: &[String]) -> Result<u64, AppError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.has_any_tag(tags));
        Ok((before - entries.len()) as u64)
    }

    async fn clear_entries(&self) -> Result<u64, AppError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok((before - entries.len()) as u64)
    }

    async fn usage(&self) -> Result<CacheUsage, AppError> {
        let entries = self.entries.read().await;
        Ok(CacheUsage {
            entries: entries.len() as u64,
            total_size: entries.values().map(|entry| entry.size).sum(),
        })
    }

    async fn least_recently_accessed(&self, limit: u64) -> Result<Vec<CacheKey>, AppError> {
        let entries = self.entries.read().await;
        let mut candidates: Vec<&CacheEntry> = entries.values().collect();
        candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.key.as_str().cmp(b.key.as_str()))
        });

        Ok(candidates
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|entry| entry.key.clone())
            .collect())
    }

    async fn delete_entries(&self, keys: &[CacheKey]) -> Result<u64, AppError> {
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn load_counters(&self) -> Result<CacheCounters, AppError> {
        Ok(*self.counters.read().await)
    }

    async fn save_counters(&self, counters: &CacheCounters) -> Result<(), AppError> {
        *self.counters.write().await = *counters;
        Ok(())
    }
}

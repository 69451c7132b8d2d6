use crate::application::ports::cache_store::CacheStore;
use crate::domain::entities::offline::{CacheCounters, CacheEntry, CacheStats, CleanupReport};
use crate::domain::value_objects::CacheKey;
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::config::CacheConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// キャッシュ読み書き時のオプション
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// `None` の場合は設定の既定 TTL
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub force_refresh: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// TTL・タグ・LRU 退避付きの読み込みキャッシュ
///
/// 読み込みは失敗しない。ストアのエラーはログに残し `None` として扱う。
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    connectivity: ConnectivityMonitor,
    config: CacheConfig,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    cleanup_errors: AtomicU32,
    last_cleanup: RwLock<Option<DateTime<Utc>>>,
    health: watch::Sender<bool>,
}

impl CacheService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        connectivity: ConnectivityMonitor,
        config: CacheConfig,
    ) -> Self {
        let (health, _receiver) = watch::channel(true);
        Self {
            store,
            connectivity,
            config,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            cleanup_errors: AtomicU32::new(0),
            last_cleanup: RwLock::new(None),
            health,
        }
    }

    /// 永続化されたカウンタを読み込む（起動時）
    pub async fn restore_counters(&self) -> Result<(), AppError> {
        let counters = self.store.load_counters().await?;
        self.hit_count.store(counters.hit_count, Ordering::Relaxed);
        self.miss_count.store(counters.miss_count, Ordering::Relaxed);
        *self.last_cleanup.write().await = counters
            .last_cleanup
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        Ok(())
    }

    /// フェッチ関数なしの読み込み。期限切れでも最後の値を返す
    pub async fn get(&self, key: &str) -> Option<Value> {
        let key = parse_read_key(key)?;
        let now = Utc::now();
        let existing = self.load(&key).await;

        match existing {
            Some(entry) if entry.is_live(now) => {
                self.record_hit(&key, now).await;
                Some(entry.data)
            }
            stale => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                stale.map(|entry| entry.data)
            }
        }
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        fetch: F,
    ) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>>,
    {
        let cache_key = parse_read_key(key)?;
        let now = Utc::now();
        let existing = self.load(&cache_key).await;

        if !options.force_refresh {
            if let Some(entry) = existing.as_ref().filter(|entry| entry.is_live(now)) {
                self.record_hit(&cache_key, now).await;
                return Some(entry.data.clone());
            }
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }

        if self.connectivity.is_online() {
            match fetch().await {
                Ok(data) => {
                    if let Err(err) = self.store_value(cache_key, data.clone(), &options).await {
                        tracing::warn!(
                            target: "offline::cache",
                            key,
                            error = %err,
                            "failed to store fetched value"
                        );
                    }
                    return Some(data);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "offline::cache",
                        key,
                        error = %err,
                        "fetch failed; falling back to cached value"
                    );
                }
            }
        }

        existing.map(|entry| entry.data)
    }

    pub async fn set(&self, key: &str, data: Value, options: &CacheOptions) -> Result<(), AppError> {
        let key = CacheKey::new(key.to_string()).map_err(AppError::ValidationError)?;
        self.store_value(key, data, options).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let key = CacheKey::new(key.to_string()).map_err(AppError::ValidationError)?;
        self.store.delete_entry(&key).await
    }

    /// いずれかのタグを持つエントリを削除
    pub async fn clear_by_tags(&self, tags: &[String]) -> Result<u64, AppError> {
        if tags.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_by_tags(tags).await?;
        tracing::debug!(target: "offline::cache", ?tags, removed, "cleared cache by tags");
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<u64, AppError> {
        let removed = self.store.clear_entries().await?;
        tracing::info!(target: "offline::cache", removed, "cleared cache");
        Ok(removed)
    }

    /// 期限切れの削除と容量超過時の退避
    pub async fn run_cleanup(&self) -> Result<CleanupReport, AppError> {
        let now = Utc::now();
        match self.cleanup(now).await {
            Ok(report) => {
                self.cleanup_errors.store(0, Ordering::Relaxed);
                *self.last_cleanup.write().await = Some(now);
                self.publish_health();
                tracing::debug!(
                    target: "offline::cache",
                    expired = report.expired_removed,
                    evicted = report.evicted,
                    remaining = report.remaining_entries,
                    "cache cleanup finished"
                );
                Ok(report)
            }
            Err(err) => {
                let errors = self.cleanup_errors.fetch_add(1, Ordering::Relaxed) + 1;
                self.publish_health();
                tracing::error!(
                    target: "offline::cache",
                    error = %err,
                    cleanup_errors = errors,
                    "cache cleanup failed"
                );
                Err(err)
            }
        }
    }

    pub async fn stats(&self) -> Result<CacheStats, AppError> {
        let usage = self.store.usage().await?;
        let hit_count = self.hit_count.load(Ordering::Relaxed);
        let miss_count = self.miss_count.load(Ordering::Relaxed);
        let total = hit_count + miss_count;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hit_count as f64 / total as f64
        };

        Ok(CacheStats {
            entries: usage.entries,
            total_size: usage.total_size,
            hit_count,
            miss_count,
            hit_rate,
            last_cleanup: *self.last_cleanup.read().await,
            healthy: self.is_healthy(),
            cleanup_errors: self.cleanup_errors.load(Ordering::Relaxed),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.cleanup_errors.load(Ordering::Relaxed) <= self.config.unhealthy_error_threshold
    }

    pub fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.health.subscribe()
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport, AppError> {
        let expired_removed = self.store.delete_expired(now).await?;
        let mut usage = self.store.usage().await?;

        let mut evicted = 0;
        if usage.total_size > self.config.max_size_bytes || usage.entries > self.config.max_entries
        {
            let count = eviction_count(usage.entries, self.config.eviction_ratio);
            let victims = self.store.least_recently_accessed(count).await?;
            evicted = self.store.delete_entries(&victims).await?;
            usage = self.store.usage().await?;
            tracing::info!(
                target: "offline::cache",
                evicted,
                total_size = usage.total_size,
                "evicted least recently used entries"
            );
        }

        self.store
            .save_counters(&CacheCounters {
                hit_count: self.hit_count.load(Ordering::Relaxed),
                miss_count: self.miss_count.load(Ordering::Relaxed),
                last_cleanup: Some(now.timestamp_millis()),
            })
            .await?;

        Ok(CleanupReport {
            expired_removed,
            evicted,
            remaining_entries: usage.entries,
            remaining_size: usage.total_size,
        })
    }

    async fn store_value(
        &self,
        key: CacheKey,
        data: Value,
        options: &CacheOptions,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let ttl = options
            .ttl
            .unwrap_or_else(|| Duration::from_millis(self.config.default_ttl_ms));
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.checked_add_signed(chrono::Duration::milliseconds(ttl_ms));
        let tags: BTreeSet<String> = options.tags.iter().cloned().collect();

        let entry = CacheEntry::new(key, data, tags, now, expires_at);
        self.store.put_entry(&entry).await
    }

    async fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.get_entry(key).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    target: "offline::cache",
                    key = %key,
                    error = %err,
                    "cache read failed"
                );
                None
            }
        }
    }

    async fn record_hit(&self, key: &CacheKey, now: DateTime<Utc>) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.store.touch_entry(key, now).await {
            tracing::warn!(
                target: "offline::cache",
                key = %key,
                error = %err,
                "failed to update access time"
            );
        }
    }

    fn publish_health(&self) {
        let healthy = self.is_healthy();
        self.health.send_if_modified(|current| {
            if *current == healthy {
                return false;
            }
            *current = healthy;
            true
        });
    }
}

fn parse_read_key(key: &str) -> Option<CacheKey> {
    match CacheKey::new(key.to_string()) {
        Ok(key) => Some(key),
        Err(err) => {
            tracing::warn!(target: "offline::cache", error = %err, "invalid cache key");
            None
        }
    }
}

/// 退避件数。`ceil(entries * ratio)` で最低1件
fn eviction_count(entries: u64, ratio: f64) -> u64 {
    ((entries as f64) * ratio).ceil().max(1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::offline::CacheUsage;
    use crate::infrastructure::cache::MemoryCacheStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn service_with(
        store: Arc<dyn CacheStore>,
        connectivity: ConnectivityMonitor,
        config: CacheConfig,
    ) -> CacheService {
        CacheService::new(store, connectivity, config)
    }

    fn memory_service() -> (CacheService, ConnectivityMonitor) {
        let connectivity = ConnectivityMonitor::online();
        let service = service_with(
            Arc::new(MemoryCacheStore::new()),
            connectivity.clone(),
            CacheConfig::default(),
        );
        (service, connectivity)
    }

    #[tokio::test]
    async fn test_live_entry_is_a_hit() {
        let (service, _) = memory_service();
        service
            .set("workflows:list", json!([1, 2]), &CacheOptions::new())
            .await
            .unwrap();

        assert_eq!(service.get("workflows:list").await, Some(json!([1, 2])));
        assert_eq!(service.get("missing").await, None);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores_when_online() {
        let (service, _) = memory_service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value = service
                .get_or_fetch("workflows:1", CacheOptions::new(), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({"id": 1})) }
                })
                .await;
            assert_eq!(value, Some(json!({"id": 1})));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
    }

    #[tokio::test]
    async fn test_force_refresh_refetches() {
        let (service, _) = memory_service();
        service
            .set("workflows:1", json!({"v": 1}), &CacheOptions::new())
            .await
            .unwrap();

        let value = service
            .get_or_fetch("workflows:1", CacheOptions::new().force_refresh(), || async {
                Ok(json!({"v": 2}))
            })
            .await;

        assert_eq!(value, Some(json!({"v": 2})));
        assert_eq!(service.get("workflows:1").await, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_offline_returns_stale_without_fetching() {
        let (service, connectivity) = memory_service();
        service
            .set(
                "workflows:1",
                json!({"v": 1}),
                &CacheOptions::new().with_ttl(Duration::from_millis(10)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        connectivity.set_online(false);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value = service
            .get_or_fetch("workflows:1", CacheOptions::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!({"v": 2})) }
            })
            .await;

        assert_eq!(value, Some(json!({"v": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_stale() {
        let (service, _) = memory_service();
        service
            .set(
                "workflows:1",
                json!({"v": 1}),
                &CacheOptions::new().with_ttl(Duration::from_millis(10)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let value = service
            .get_or_fetch("workflows:1", CacheOptions::new(), || async {
                Err(AppError::Network("unreachable".into()))
            })
            .await;
        assert_eq!(value, Some(json!({"v": 1})));

        let missing = service
            .get_or_fetch("workflows:2", CacheOptions::new(), || async {
                Err(AppError::Network("unreachable".into()))
            })
            .await;
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_entries() {
        let (service, _) = memory_service();
        service
            .set(
                "short",
                json!(1),
                &CacheOptions::new().with_ttl(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        service
            .set("long", json!(2), &CacheOptions::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let report = service.run_cleanup().await.unwrap();

        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(report.remaining_entries, 1);
        assert_eq!(service.get("short").await, None);
        assert!(service.stats().await.unwrap().last_cleanup.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_least_recently_accessed() {
        let store = Arc::new(MemoryCacheStore::new());
        let config = CacheConfig {
            max_entries: 5,
            ..CacheConfig::default()
        };
        let service = service_with(store.clone(), ConnectivityMonitor::online(), config);

        for i in 0..10 {
            service
                .set(&format!("item:{i}"), json!(i), &CacheOptions::new())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // item:0 を最近アクセスしたことにする
        assert_eq!(service.get("item:0").await, Some(json!(0)));

        let report = service.run_cleanup().await.unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(store.len().await, 9);
        assert!(service.get("item:0").await.is_some());
        assert!(service.get("item:1").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_oldest_when_over_size_limit() {
        let store = Arc::new(MemoryCacheStore::new());
        let config = CacheConfig {
            max_size_bytes: 50,
            ..CacheConfig::default()
        };
        let service = service_with(store.clone(), ConnectivityMonitor::online(), config);

        // 各エントリは `"v00"` の5バイト。20件で100バイト
        for i in 0..20 {
            service
                .set(&format!("k:{i:02}"), json!(format!("v{i:02}")), &CacheOptions::new())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let before = service.stats().await.unwrap();
        assert_eq!(before.entries, 20);
        assert!(before.total_size > 50);

        let report = service.run_cleanup().await.unwrap();

        assert_eq!(report.evicted, 2);
        assert_eq!(report.remaining_entries, 18);
        assert!(report.remaining_entries * 10 <= before.entries * 9);
        assert_eq!(store.len().await, 18);
        assert!(service.get("k:00").await.is_none());
        assert!(service.get("k:01").await.is_none());
        for i in 2..20 {
            assert!(service.get(&format!("k:{i:02}")).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_clear_by_tags_matches_any_tag() {
        let (service, _) = memory_service();
        service
            .set("a", json!(1), &CacheOptions::new().with_tags(["workflows"]))
            .await
            .unwrap();
        service
            .set("b", json!(2), &CacheOptions::new().with_tags(["steps", "workflows"]))
            .await
            .unwrap();
        service
            .set("c", json!(3), &CacheOptions::new().with_tags(["users"]))
            .await
            .unwrap();

        let removed = service
            .clear_by_tags(&["steps".to_string(), "workflows".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(service.get("c").await, Some(json!(3)));
        assert_eq!(service.clear_all().await.unwrap(), 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get_entry(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn put_entry(&self, _entry: &CacheEntry) -> Result<(), AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn touch_entry(&self, _key: &CacheKey, _now: DateTime<Utc>) -> Result<(), AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn delete_entry(&self, _key: &CacheKey) -> Result<bool, AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn delete_by_tags(&self, _tags: &[String]) -> Result<u64, AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn clear_entries(&self) -> Result<u64, AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64, AppError> {
            Err(AppError::Storage("disk unavailable".into()))
        }
        async fn usage(&self) -> Result<CacheUsage, AppError> {
            Ok(CacheUsage::default())
        }
        async fn least_recently_accessed(&self, _limit: u64) -> Result<Vec<CacheKey>, AppError> {
            Ok(Vec::new())
        }
        async fn delete_entries(&self, _keys: &[CacheKey]) -> Result<u64, AppError> {
            Ok(0)
        }
        async fn load_counters(&self) -> Result<CacheCounters, AppError> {
            Ok(CacheCounters::default())
        }
        async fn save_counters(&self, _counters: &CacheCounters) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_repeated_cleanup_failures_mark_unhealthy() {
        let config = CacheConfig {
            unhealthy_error_threshold: 2,
            ..CacheConfig::default()
        };
        let service = service_with(Arc::new(BrokenStore), ConnectivityMonitor::online(), config);
        let mut health = service.subscribe_health();

        for _ in 0..2 {
            assert!(service.run_cleanup().await.is_err());
        }
        assert!(service.is_healthy());

        assert!(service.run_cleanup().await.is_err());
        assert!(!service.is_healthy());
        assert!(health.has_changed().unwrap());
        assert!(!*health.borrow_and_update());

        let stats = service.stats().await.unwrap();
        assert!(!stats.healthy);
        assert_eq!(stats.cleanup_errors, 3);

        // 読み込みは失敗しない
        assert_eq!(service.get("anything").await, None);
    }

    #[tokio::test]
    async fn test_counters_survive_restore() {
        let store = Arc::new(MemoryCacheStore::new());
        let first = service_with(store.clone(), ConnectivityMonitor::online(), CacheConfig::default());
        first.set("a", json!(1), &CacheOptions::new()).await.unwrap();
        first.get("a").await;
        first.get("b").await;
        first.run_cleanup().await.unwrap();

        let second = service_with(store, ConnectivityMonitor::online(), CacheConfig::default());
        second.restore_counters().await.unwrap();
        let stats = second.stats().await.unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert!(stats.last_cleanup.is_some());
    }

    #[test]
    fn test_eviction_count_rounds_up() {
        assert_eq!(eviction_count(10, 0.1), 1);
        assert_eq!(eviction_count(11, 0.1), 2);
        assert_eq!(eviction_count(0, 0.1), 1);
    }
}

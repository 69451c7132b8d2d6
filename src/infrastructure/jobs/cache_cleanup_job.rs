use crate::application::services::CacheService;
use crate::domain::entities::offline::CleanupReport;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Instant;

/// 期限切れキャッシュの削除と LRU 退避を定期実行するジョブ
pub struct CacheCleanupJob {
    cache: Arc<CacheService>,
}

impl CacheCleanupJob {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    pub async fn run_once(&self) -> Result<CleanupReport, AppError> {
        let started = Instant::now();
        let result = self.cache.run_cleanup().await;
        let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        match &result {
            Ok(report) => {
                tracing::info!(
                    target: "offline::cache",
                    expired_removed = report.expired_removed,
                    evicted = report.evicted,
                    remaining_entries = report.remaining_entries,
                    remaining_size = report.remaining_size,
                    duration_ms,
                    "cache cleanup job completed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "offline::cache",
                    error = %err,
                    healthy = self.cache.is_healthy(),
                    duration_ms,
                    "cache cleanup job failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::CacheOptions;
    use crate::infrastructure::cache::MemoryCacheStore;
    use crate::infrastructure::network::ConnectivityMonitor;
    use crate::shared::config::CacheConfig;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn run_once_reports_expired_entries() {
        let cache = Arc::new(CacheService::new(
            Arc::new(MemoryCacheStore::new()),
            ConnectivityMonitor::online(),
            CacheConfig::default(),
        ));
        cache
            .set(
                "workflows:list",
                json!([1]),
                &CacheOptions::new().with_ttl(Duration::from_millis(5)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job = CacheCleanupJob::new(cache.clone());
        let report = job.run_once().await.unwrap();

        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.remaining_entries, 0);
        assert_eq!(cache.stats().await.unwrap().cleanup_errors, 0);
    }
}

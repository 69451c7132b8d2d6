use crate::application::ports::cache_store::CacheStore;
use crate::application::ports::offline_store::OfflinePersistence;
use crate::application::ports::sync_remote::SyncRemote;
use crate::application::services::{
    load_or_create_device_id, CacheService, ChangeQueueService, DraftService, SyncService,
    SyncStateStore,
};
use crate::domain::value_objects::DeviceId;
use crate::infrastructure::cache::SqliteCacheStore;
use crate::infrastructure::jobs::{SchedulerHandle, SyncScheduler};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::infrastructure::offline::SqliteOfflinePersistence;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

/// オフライン同期サブシステム全体の状態
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub device_id: DeviceId,
    pub connectivity: ConnectivityMonitor,
    pub sync_state: SyncStateStore,
    pub change_queue: Arc<ChangeQueueService>,
    pub drafts: Arc<DraftService>,
    pub cache: Arc<CacheService>,
    pub sync: Arc<SyncService>,
}

impl AppState {
    pub async fn new(config: AppConfig, remote: Arc<dyn SyncRemote>) -> Result<Self, AppError> {
        Self::with_connectivity(config, remote, ConnectivityMonitor::online()).await
    }

    pub async fn with_connectivity(
        config: AppConfig,
        remote: Arc<dyn SyncRemote>,
        connectivity: ConnectivityMonitor,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let db_pool = initialize_database(&config).await?;
        let persistence: Arc<dyn OfflinePersistence> =
            Arc::new(SqliteOfflinePersistence::new(db_pool.clone()));
        let device_id = load_or_create_device_id(persistence.as_ref()).await?;
        tracing::info!(target: "offline::state", device_id = %device_id, "device identity loaded");

        let sync_state = SyncStateStore::new();
        let change_queue = Arc::new(ChangeQueueService::new(
            persistence.clone(),
            device_id.clone(),
            sync_state.clone(),
        ));
        let drafts = Arc::new(DraftService::new(persistence.clone(), change_queue.clone()));

        let cache_store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::new(db_pool.clone()));
        let cache = Arc::new(CacheService::new(
            cache_store,
            connectivity.clone(),
            config.cache.clone(),
        ));
        if let Err(err) = cache.restore_counters().await {
            tracing::warn!(target: "offline::cache", error = %err, "failed to restore cache counters");
        }

        let sync = Arc::new(SyncService::new(
            persistence,
            remote,
            connectivity.clone(),
            device_id.clone(),
            sync_state.clone(),
            config.sync.clone(),
        ));
        sync.restore_status().await?;

        Ok(Self {
            config,
            db_pool,
            device_id,
            connectivity,
            sync_state,
            change_queue,
            drafts,
            cache,
            sync,
        })
    }

    /// 定期同期とキャッシュ掃除を開始する
    pub fn start_background(&self) -> SchedulerHandle {
        SyncScheduler::new(
            self.sync.clone(),
            self.cache.clone(),
            self.connectivity.clone(),
            &self.config.sync,
            &self.config.cache,
        )
        .start()
    }

    pub async fn close(&self) {
        self.db_pool.close().await;
    }
}

async fn initialize_database(config: &AppConfig) -> Result<DbPool, AppError> {
    let url = config.database.url.as_str();
    let in_memory = url.contains(":memory:");

    if !in_memory {
        if let Some(parent) = database_file_path(url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::Storage(format!("failed to create {}: {err}", parent.display()))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // インメモリ DB は接続ごとに別物になるため1本に絞る
    let max_connections = if in_memory {
        1
    } else {
        config.database.max_connections
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect_with(options)
        .await?;
    tracing::info!(target: "offline::state", url, "database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(target: "offline::state", "database migrations completed");

    Ok(pool)
}

fn database_file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(Path::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_file_path_strips_scheme_and_query() {
        assert_eq!(
            database_file_path("sqlite://data/app.db?mode=rwc"),
            Some(Path::new("data/app.db"))
        );
        assert_eq!(
            database_file_path("sqlite:data/app.db"),
            Some(Path::new("data/app.db"))
        );
        assert_eq!(database_file_path("postgres://x"), None);
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fieldsync::application::ports::sync_remote::SyncRemote;
use fieldsync::domain::entities::offline::SyncStatus;
use fieldsync::domain::value_objects::EntityKey;
use fieldsync::infrastructure::network::ConnectivityMonitor;
use fieldsync::{AppConfig, AppState};

#[allow(dead_code)]
pub fn memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config
}

#[allow(dead_code)]
pub fn file_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.join("fieldsync.db").display());
    config
}

pub async fn setup_state(
    config: AppConfig,
    remote: Arc<dyn SyncRemote>,
    connectivity: ConnectivityMonitor,
) -> AppState {
    AppState::with_connectivity(config, remote, connectivity)
        .await
        .expect("app state")
}

#[allow(dead_code)]
pub fn step_key(id: &str) -> EntityKey {
    EntityKey::parse("step-execution", id).expect("entity key")
}

/// 条件を満たす状態が通知されるまで待つ
#[allow(dead_code)]
pub async fn wait_for_status<F>(state: &AppState, predicate: F) -> SyncStatus
where
    F: Fn(&SyncStatus) -> bool,
{
    let mut rx = state.sync.subscribe();
    let wait = async {
        loop {
            {
                let status = rx.borrow_and_update();
                if predicate(&status) {
                    return status.clone();
                }
            }
            rx.changed().await.expect("status channel closed");
        }
    };

    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for sync status")
}

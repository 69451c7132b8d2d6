use super::cache_cleanup_job::CacheCleanupJob;
use crate::application::services::{CacheService, SyncService};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::config::{CacheConfig, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// 定期同期・再接続時の同期・キャッシュ掃除を駆動する
pub struct SyncScheduler {
    sync: Arc<SyncService>,
    cleanup: Arc<CacheCleanupJob>,
    connectivity: ConnectivityMonitor,
    auto_sync: bool,
    sync_interval: Duration,
    cleanup_interval: Duration,
}

/// 起動中のスケジューラ。破棄またはシャットダウンでタスクを止める
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    _cancel_on_drop: DropGuard,
}

impl SyncScheduler {
    pub fn new(
        sync: Arc<SyncService>,
        cache: Arc<CacheService>,
        connectivity: ConnectivityMonitor,
        sync_config: &SyncConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            sync,
            cleanup: Arc::new(CacheCleanupJob::new(cache)),
            connectivity,
            auto_sync: sync_config.auto_sync,
            sync_interval: Duration::from_secs(sync_config.sync_interval.max(1)),
            cleanup_interval: Duration::from_secs(cache_config.cleanup_interval.max(1)),
        }
    }

    pub fn with_intervals(mut self, sync_interval: Duration, cleanup_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self.cleanup_interval = cleanup_interval;
        self
    }

    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        if self.auto_sync {
            // 起動直後の接続変化を取りこぼさないよう先に購読する
            let online_rx = self.connectivity.subscribe();
            let was_online = *online_rx.borrow();
            tasks.push(tokio::spawn(run_sync_loop(
                self.sync.clone(),
                self.connectivity.clone(),
                online_rx,
                was_online,
                self.sync_interval,
                cancel.child_token(),
            )));
        } else {
            tracing::info!(target: "offline::scheduler", "auto sync disabled");
        }

        tasks.push(tokio::spawn(run_cleanup_loop(
            self.cleanup.clone(),
            self.cleanup_interval,
            cancel.child_token(),
        )));

        tracing::info!(
            target: "offline::scheduler",
            sync_interval_ms = self.sync_interval.as_millis() as u64,
            cleanup_interval_ms = self.cleanup_interval.as_millis() as u64,
            "scheduler started"
        );

        SchedulerHandle {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            tasks,
        }
    }
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|task| !task.is_finished())
    }

    /// 実行中の同期サイクルは完了まで待つ
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(target: "offline::scheduler", error = %err, "scheduler task panicked");
            }
        }
        tracing::info!(target: "offline::scheduler", "scheduler stopped");
    }
}

async fn run_sync_loop(
    sync: Arc<SyncService>,
    connectivity: ConnectivityMonitor,
    mut online_rx: watch::Receiver<bool>,
    mut was_online: bool,
    period: Duration,
    cancel: CancellationToken,
) {
    // 初回 tick は起動直後ではなく1周期後
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if connectivity.is_online() {
                    let outcome = sync.trigger_sync().await;
                    tracing::debug!(target: "offline::scheduler", ?outcome, "periodic sync");
                }
            }
            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    tracing::info!(target: "offline::scheduler", "back online; syncing");
                    let outcome = sync.trigger_sync().await;
                    tracing::debug!(target: "offline::scheduler", ?outcome, "reconnect sync");
                }
                was_online = online;
            }
        }
    }
}

async fn run_cleanup_loop(job: Arc<CacheCleanupJob>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // 失敗はジョブ側で記録済み
                let _ = job.run_once().await;
            }
        }
    }
}

use crate::application::ports::offline_store::{OfflinePersistence, META_LAST_SYNC_TIME};
use crate::application::ports::sync_remote::{PushResponse, SyncRemote};
use crate::application::services::sync_state::SyncStateStore;
use crate::domain::entities::offline::{
    ChangeOutcome, ChangeOutcomeUpdate, ChangeRecord, ShadowRecord, SkipReason, SyncOutcome,
    SyncPhase, SyncReport, SyncStatus,
};
use crate::domain::value_objects::{ChangeId, DeviceId, EntityKey};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::infrastructure::offline::{SyncHealthMetrics, SyncHealthSnapshot};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};

const REJECTED_BY_SERVER: &str = "Rejected by server";

/// Pull してから Push する同期エンジン（サーバー優先）
pub struct SyncService {
    persistence: Arc<dyn OfflinePersistence>,
    remote: Arc<dyn SyncRemote>,
    connectivity: ConnectivityMonitor,
    device_id: DeviceId,
    state: SyncStateStore,
    metrics: SyncHealthMetrics,
    config: SyncConfig,
    gate: Mutex<()>,
}

struct CycleResult {
    report: SyncReport,
    completed_at: DateTime<Utc>,
}

#[derive(Default)]
struct ReconcileSummary {
    applied: u32,
    rejected: u32,
    conflicts: u32,
}

impl SyncService {
    pub fn new(
        persistence: Arc<dyn OfflinePersistence>,
        remote: Arc<dyn SyncRemote>,
        connectivity: ConnectivityMonitor,
        device_id: DeviceId,
        state: SyncStateStore,
        config: SyncConfig,
    ) -> Self {
        let metrics = SyncHealthMetrics::new(config.health_failure_threshold);
        Self {
            persistence,
            remote,
            connectivity,
            device_id,
            state,
            metrics,
            config,
            gate: Mutex::new(()),
        }
    }

    /// 前回同期時刻と未同期件数を状態へ反映する（起動時）
    pub async fn restore_status(&self) -> Result<(), AppError> {
        let last_sync = self.last_sync_time().await?;
        self.state.record_completion(last_sync, true, 0);
        let pending = self.persistence.count_pending_changes().await?;
        self.state.set_pending(pending);
        Ok(())
    }

    /// 同期を1回実行する。実行中・オフライン時は何もしない
    pub async fn trigger_sync(&self) -> SyncOutcome {
        if !self.connectivity.is_online() {
            tracing::debug!(target: "offline::sync", "offline; sync skipped");
            return SyncOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }

        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(target: "offline::sync", "sync already in progress");
                return SyncOutcome::Skipped {
                    reason: SkipReason::AlreadySyncing,
                };
            }
        };

        self.state.set_phase(SyncPhase::Syncing);
        let started = Instant::now();
        let outcome = match self.run_cycle().await {
            Ok(result) => {
                let snapshot = self.metrics.record_success(elapsed_ms(started));
                self.state.record_completion(
                    Some(result.completed_at),
                    snapshot.healthy,
                    saturating_u32(snapshot.consecutive_failure),
                );
                tracing::info!(
                    target: "offline::sync",
                    pulled = result.report.pulled,
                    pushed = result.report.pushed,
                    applied = result.report.applied,
                    rejected = result.report.rejected,
                    conflicts = result.report.conflicts,
                    duration_ms = snapshot.last_duration_ms.unwrap_or_default(),
                    "sync cycle completed"
                );
                SyncOutcome::Completed(result.report)
            }
            Err(err) => {
                let message = err.to_string();
                let snapshot = self.metrics.record_failure(&message, elapsed_ms(started));
                self.state.push_error(message.clone());
                self.state.set_phase(SyncPhase::Failed);
                self.state.record_completion(
                    None,
                    snapshot.healthy,
                    saturating_u32(snapshot.consecutive_failure),
                );
                tracing::error!(
                    target: "offline::sync",
                    error = %message,
                    consecutive_failures = snapshot.consecutive_failure,
                    healthy = snapshot.healthy,
                    "sync cycle failed"
                );
                SyncOutcome::Failed { message }
            }
        };

        self.refresh_pending().await;
        outcome
    }

    pub fn status(&self) -> SyncStatus {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.state.subscribe()
    }

    pub fn dismiss_errors(&self) {
        self.state.dismiss_errors();
    }

    pub fn health(&self) -> SyncHealthSnapshot {
        self.metrics.snapshot()
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(raw) = self.persistence.get_meta(META_LAST_SYNC_TIME).await? else {
            return Ok(None);
        };
        let millis = raw.parse::<i64>().map_err(|err| {
            AppError::DeserializationError(format!("invalid last_sync_time {raw}: {err}"))
        })?;
        Ok(DateTime::<Utc>::from_timestamp_millis(millis))
    }

    async fn run_cycle(&self) -> Result<CycleResult, AppError> {
        let since = self.last_sync_time().await?;
        let mut report = SyncReport::default();

        // 1. Pull
        let pulled = self.remote.pull(&self.device_id, since).await?;
        report.pulled = saturating_u32(pulled.changes.len() as u64);
        for change in pulled.changes {
            let shadow = ShadowRecord::new(
                change.entity_key(),
                change.payload,
                change.version,
                pulled.server_ts,
            );
            self.persistence.upsert_shadow(&shadow).await?;
        }

        // 2. Push
        let pending = self.persistence.list_pending_changes().await?;
        let (sendable, held): (Vec<ChangeRecord>, Vec<ChangeRecord>) = match self.config.max_retries
        {
            Some(max) => pending
                .into_iter()
                .partition(|record| record.retry_count < max),
            None => (pending, Vec::new()),
        };
        report.dead_lettered = saturating_u32(held.len() as u64);
        if !held.is_empty() {
            tracing::warn!(
                target: "offline::sync",
                held = held.len(),
                "changes exceeded retry limit and were held back"
            );
        }

        if !sendable.is_empty() {
            report.pushed = saturating_u32(sendable.len() as u64);
            let response = self
                .remote
                .push(&self.device_id, &sendable, since)
                .await?;

            // 3. Reconcile
            let summary = self.reconcile(&sendable, response).await?;
            report.applied = summary.applied;
            report.rejected = summary.rejected;
            report.conflicts = summary.conflicts;
        }

        // 4. 完了。since にはサーバーの server_ts ではなくクライアント時刻を記録する
        let completed_at = Utc::now();
        self.persistence
            .set_meta(
                META_LAST_SYNC_TIME,
                &completed_at.timestamp_millis().to_string(),
            )
            .await?;

        Ok(CycleResult {
            report,
            completed_at,
        })
    }

    /// push 結果をキューとシャドウへ反映する
    async fn reconcile(
        &self,
        sent: &[ChangeRecord],
        response: PushResponse,
    ) -> Result<ReconcileSummary, AppError> {
        let applied: HashSet<ChangeId> = response
            .applied
            .into_iter()
            .map(|applied| applied.id)
            .collect();

        let now = Utc::now();
        let mut conflicted: HashSet<EntityKey> = HashSet::new();
        for conflict in response.conflicts {
            let key = conflict.entity_key();
            let message = format!(
                "Conflict on {key}: server version {} was kept",
                conflict.server_version
            );
            let shadow = ShadowRecord::new(
                key.clone(),
                conflict.server_data,
                conflict.server_version,
                now,
            );
            self.persistence.upsert_shadow(&shadow).await?;

            tracing::warn!(
                target: "offline::sync",
                entity = %key,
                server_version = conflict.server_version,
                "conflict resolved in favor of server"
            );
            self.state.push_error(message);
            conflicted.insert(key);
        }

        let mut summary = ReconcileSummary::default();
        let updates: Vec<ChangeOutcomeUpdate> = sent
            .iter()
            .map(|record| {
                let outcome = if applied.contains(&record.id) {
                    summary.applied += 1;
                    ChangeOutcome::Applied
                } else if conflicted.contains(&record.entity_key()) {
                    summary.conflicts += 1;
                    ChangeOutcome::Conflicted
                } else {
                    summary.rejected += 1;
                    ChangeOutcome::Rejected {
                        error: REJECTED_BY_SERVER.to_string(),
                    }
                };
                ChangeOutcomeUpdate::new(record.id.clone(), outcome)
            })
            .collect();

        self.persistence.apply_change_outcomes(&updates).await?;
        Ok(summary)
    }

    async fn refresh_pending(&self) {
        match self.persistence.count_pending_changes().await {
            Ok(pending) => self.state.set_pending(pending),
            Err(err) => {
                tracing::warn!(
                    target: "offline::sync",
                    error = %err,
                    "failed to refresh pending count"
                );
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

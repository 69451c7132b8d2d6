use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    /// 失敗を通知した直後の一時状態。すぐに Idle へ戻る
    Failed,
}

/// UI が購読する同期状態のスナップショット
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub pending_changes: u64,
    pub errors: Vec<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub consecutive_failures: u32,
}

impl SyncStatus {
    pub fn initial() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.phase == SyncPhase::Syncing
    }
}

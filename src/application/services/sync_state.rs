use crate::domain::entities::offline::{SyncPhase, SyncStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// エラー一覧に保持する最大件数
pub const MAX_SYNC_ERRORS: usize = 50;

/// UI へ公開する同期状態。インスタンスごとに独立している
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    sender: Arc<watch::Sender<SyncStatus>>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(SyncStatus::initial());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        self.sender.send_modify(|status| status.phase = phase);
    }

    pub fn set_pending(&self, pending_changes: u64) {
        self.sender.send_if_modified(|status| {
            if status.pending_changes == pending_changes {
                return false;
            }
            status.pending_changes = pending_changes;
            true
        });
    }

    pub fn push_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.sender.send_modify(|status| {
            status.errors.push(message);
            if status.errors.len() > MAX_SYNC_ERRORS {
                let overflow = status.errors.len() - MAX_SYNC_ERRORS;
                status.errors.drain(..overflow);
            }
        });
    }

    pub fn dismiss_errors(&self) {
        self.sender.send_if_modified(|status| {
            if status.errors.is_empty() {
                return false;
            }
            status.errors.clear();
            true
        });
    }

    pub fn record_completion(
        &self,
        last_sync_at: Option<DateTime<Utc>>,
        healthy: bool,
        consecutive_failures: u32,
    ) {
        self.sender.send_modify(|status| {
            status.phase = SyncPhase::Idle;
            if last_sync_at.is_some() {
                status.last_sync_at = last_sync_at;
            }
            status.healthy = healthy;
            status.consecutive_failures = consecutive_failures;
        });
    }
}

impl Default for SyncStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_is_bounded() {
        let state = SyncStateStore::new();
        for i in 0..(MAX_SYNC_ERRORS + 5) {
            state.push_error(format!("error {i}"));
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.errors.len(), MAX_SYNC_ERRORS);
        assert_eq!(snapshot.errors.first().map(String::as_str), Some("error 5"));

        state.dismiss_errors();
        assert!(state.snapshot().errors.is_empty());
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let a = SyncStateStore::new();
        let b = SyncStateStore::new();
        a.set_pending(3);
        assert_eq!(a.snapshot().pending_changes, 3);
        assert_eq!(b.snapshot().pending_changes, 0);
        assert!(b.snapshot().healthy);
    }
}

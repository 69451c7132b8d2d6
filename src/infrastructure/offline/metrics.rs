use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcomeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealthSnapshot {
    pub total_success: u64,
    pub total_failure: u64,
    pub success_streak: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<SyncOutcomeStatus>,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub healthy: bool,
}

#[derive(Default, Clone)]
struct LastCycleMetadata {
    last_outcome: Option<SyncOutcomeStatus>,
    last_error: Option<String>,
    duration_ms: Option<u64>,
}

/// 同期サイクルの成功/失敗の連続回数を追跡する
pub struct SyncHealthMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    success_streak: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    failure_threshold: u64,
    metadata: Mutex<LastCycleMetadata>,
}

impl SyncHealthMetrics {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            success_streak: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            failure_threshold: u64::from(failure_threshold.max(1)),
            metadata: Mutex::new(LastCycleMetadata::default()),
        }
    }

    pub fn record_success(&self, duration_ms: u64) -> SyncHealthSnapshot {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.success_streak.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failure.store(0, Ordering::Relaxed);
        self.last_success_ms
            .store(current_unix_ms(), Ordering::Relaxed);

        if let Ok(mut guard) = self.metadata.lock() {
            guard.last_outcome = Some(SyncOutcomeStatus::Success);
            guard.last_error = None;
            guard.duration_ms = Some(duration_ms);
        }
        self.snapshot()
    }

    pub fn record_failure(&self, error: &str, duration_ms: u64) -> SyncHealthSnapshot {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.success_streak.store(0, Ordering::Relaxed);
        self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms
            .store(current_unix_ms(), Ordering::Relaxed);

        if let Ok(mut guard) = self.metadata.lock() {
            guard.last_outcome = Some(SyncOutcomeStatus::Failure);
            guard.last_error = Some(error.to_string());
            guard.duration_ms = Some(duration_ms);
        }
        self.snapshot()
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failure.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures() < self.failure_threshold
    }

    pub fn snapshot(&self) -> SyncHealthSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        SyncHealthSnapshot {
            total_success: self.success.load(Ordering::Relaxed),
            total_failure: self.failure.load(Ordering::Relaxed),
            success_streak: self.success_streak.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failures(),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: metadata.last_outcome,
            last_error: metadata.last_error,
            last_duration_ms: metadata.duration_ms,
            healthy: self.is_healthy(),
        }
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_make_unhealthy() {
        let metrics = SyncHealthMetrics::new(3);

        metrics.record_failure("offline", 10);
        metrics.record_failure("offline", 10);
        assert!(metrics.is_healthy());

        let snapshot = metrics.record_failure("timeout", 12);
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.consecutive_failure, 3);
        assert_eq!(snapshot.last_error.as_deref(), Some("timeout"));
        assert_eq!(snapshot.last_outcome, Some(SyncOutcomeStatus::Failure));
    }

    #[test]
    fn success_resets_failure_streak() {
        let metrics = SyncHealthMetrics::new(3);
        for _ in 0..4 {
            metrics.record_failure("boom", 1);
        }

        let snapshot = metrics.record_success(5);
        assert!(snapshot.healthy);
        assert_eq!(snapshot.consecutive_failure, 0);
        assert_eq!(snapshot.success_streak, 1);
        assert_eq!(snapshot.total_failure, 4);
        assert_eq!(snapshot.total_success, 1);
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.last_duration_ms, Some(5));
    }
}

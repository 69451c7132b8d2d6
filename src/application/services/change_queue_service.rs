use crate::application::ports::offline_store::OfflinePersistence;
use crate::application::services::sync_state::SyncStateStore;
use crate::domain::entities::offline::ChangeRecord;
use crate::domain::value_objects::{ChangeId, ChangeOperation, DeviceId, EntityKey};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// ユーザー操作を変更レコードとしてキューに積む
pub struct ChangeQueueService {
    persistence: Arc<dyn OfflinePersistence>,
    device_id: DeviceId,
    state: SyncStateStore,
}

impl ChangeQueueService {
    pub fn new(
        persistence: Arc<dyn OfflinePersistence>,
        device_id: DeviceId,
        state: SyncStateStore,
    ) -> Self {
        Self {
            persistence,
            device_id,
            state,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// 重複排除はしない。同じエンティティへの変更も投入順に再生される
    pub async fn queue_change(
        &self,
        entity_name: &str,
        entity_id: &str,
        operation: ChangeOperation,
        payload: Value,
    ) -> Result<ChangeRecord, AppError> {
        let key = EntityKey::parse(entity_name, entity_id).map_err(AppError::ValidationError)?;
        let record = ChangeRecord::new(
            self.device_id.clone(),
            key.entity_name,
            key.entity_id,
            operation,
            payload,
            Utc::now(),
        );

        self.persistence.append_change(&record).await?;
        tracing::debug!(
            target: "offline::queue",
            change_id = %record.id,
            entity = %record.entity_key(),
            operation = %record.operation,
            "queued change"
        );

        self.count_pending().await?;
        Ok(record)
    }

    /// 未同期件数を数え直し、購読者へ通知する
    pub async fn count_pending(&self) -> Result<u64, AppError> {
        let pending = self.persistence.count_pending_changes().await?;
        self.state.set_pending(pending);
        Ok(pending)
    }

    pub async fn pending_changes(&self) -> Result<Vec<ChangeRecord>, AppError> {
        self.persistence.list_pending_changes().await
    }

    pub async fn get_change(&self, id: &ChangeId) -> Result<Option<ChangeRecord>, AppError> {
        self.persistence.get_change(id).await
    }

    pub async fn changes_for(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<ChangeRecord>, AppError> {
        let key = EntityKey::parse(entity_name, entity_id).map_err(AppError::ValidationError)?;
        self.persistence.list_changes_for(&key).await
    }

    /// キューを空にする（明示的なキャッシュクリア時のみ）
    pub async fn clear(&self) -> Result<u64, AppError> {
        let removed = self.persistence.clear_changes().await?;
        tracing::info!(target: "offline::queue", removed, "cleared change queue");
        self.count_pending().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::offline::SqliteOfflinePersistence;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_service() -> (ChangeQueueService, SyncStateStore) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let state = SyncStateStore::new();
        let service = ChangeQueueService::new(
            Arc::new(SqliteOfflinePersistence::new(pool)),
            DeviceId::new("device-a".into()).unwrap(),
            state.clone(),
        );
        (service, state)
    }

    #[tokio::test]
    async fn test_queue_change_starts_unsynced() {
        let (service, state) = setup_service().await;

        let record = service
            .queue_change("step-execution", "i1-s1", ChangeOperation::Update, json!({"qty": 3}))
            .await
            .unwrap();

        assert!(!record.synced);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.device_id.as_str(), "device-a");
        assert_eq!(record.id.device_prefix(), Some("device-a"));
        assert_eq!(state.snapshot().pending_changes, 1);

        let stored = service.get_change(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.payload, json!({"qty": 3}));
    }

    #[tokio::test]
    async fn test_repeated_changes_are_not_deduplicated() {
        let (service, state) = setup_service().await;

        for qty in 1..=3 {
            service
                .queue_change("step-execution", "i1-s1", ChangeOperation::Update, json!({"qty": qty}))
                .await
                .unwrap();
        }

        let pending = service.pending_changes().await.unwrap();
        let quantities: Vec<_> = pending.iter().map(|c| c.payload["qty"].clone()).collect();
        assert_eq!(quantities, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(state.snapshot().pending_changes, 3);
        assert_eq!(service.changes_for("step-execution", "i1-s1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_entity_is_rejected() {
        let (service, _) = setup_service().await;
        let err = service
            .queue_change(" ", "i1", ChangeOperation::Create, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_clear_resets_pending_count() {
        let (service, state) = setup_service().await;
        service
            .queue_change("step-execution", "i1-s1", ChangeOperation::Delete, Value::Null)
            .await
            .unwrap();

        assert_eq!(service.clear().await.unwrap(), 1);
        assert_eq!(state.snapshot().pending_changes, 0);
    }
}

use crate::application::ports::offline_store::OfflinePersistence;
use crate::application::services::change_queue_service::ChangeQueueService;
use crate::domain::entities::offline::{ChangeRecord, DraftRecord};
use crate::domain::value_objects::{ChangeOperation, EntityKey, EntityName};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// 下書き（ローカル専用・後勝ち）
pub struct DraftService {
    persistence: Arc<dyn OfflinePersistence>,
    queue: Arc<ChangeQueueService>,
}

impl DraftService {
    pub fn new(persistence: Arc<dyn OfflinePersistence>, queue: Arc<ChangeQueueService>) -> Self {
        Self { persistence, queue }
    }

    pub async fn save_draft(
        &self,
        entity_name: &str,
        entity_id: &str,
        data: Value,
    ) -> Result<DraftRecord, AppError> {
        let key = parse_key(entity_name, entity_id)?;
        let draft = DraftRecord::new(key, data, Utc::now());
        self.persistence.save_draft(&draft).await
    }

    pub async fn get_draft(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Option<Value>, AppError> {
        let key = parse_key(entity_name, entity_id)?;
        Ok(self
            .persistence
            .get_draft(&key)
            .await?
            .map(|draft| draft.data))
    }

    pub async fn delete_draft(&self, entity_name: &str, entity_id: &str) -> Result<(), AppError> {
        let key = parse_key(entity_name, entity_id)?;
        self.persistence.delete_draft(&key).await?;
        Ok(())
    }

    pub async fn list_drafts(&self, entity_name: &str) -> Result<Vec<DraftRecord>, AppError> {
        let name = EntityName::new(entity_name.to_string()).map_err(AppError::ValidationError)?;
        self.persistence.list_drafts(&name).await
    }

    /// 下書きを変更レコードとしてキューに積み、下書きを削除する
    pub async fn promote_draft(
        &self,
        entity_name: &str,
        entity_id: &str,
        operation: ChangeOperation,
    ) -> Result<ChangeRecord, AppError> {
        let key = parse_key(entity_name, entity_id)?;
        let draft = self
            .persistence
            .get_draft(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draft {key}")))?;

        let record = self
            .queue
            .queue_change(entity_name, entity_id, operation, draft.data)
            .await?;
        self.persistence.delete_draft(&key).await?;
        Ok(record)
    }
}

fn parse_key(entity_name: &str, entity_id: &str) -> Result<EntityKey, AppError> {
    EntityKey::parse(entity_name, entity_id).map_err(AppError::ValidationError)
}

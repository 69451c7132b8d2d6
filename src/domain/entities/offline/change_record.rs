use crate::domain::value_objects::{
    ChangeId, ChangeOperation, DeviceId, EntityId, EntityKey, EntityName,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 送信待ちのローカル変更
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: ChangeId,
    pub entity_name: EntityName,
    pub entity_id: EntityId,
    pub operation: ChangeOperation,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub synced: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// サーバー優先で競合解決されたレコード
    #[serde(default)]
    pub conflicted: bool,
}

impl ChangeRecord {
    pub fn new(
        device_id: DeviceId,
        entity_name: EntityName,
        entity_id: EntityId,
        operation: ChangeOperation,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangeId::generate(&device_id),
            entity_name,
            entity_id,
            operation,
            payload,
            timestamp,
            device_id,
            synced: false,
            retry_count: 0,
            last_error: None,
            conflicted: false,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_name.clone(), self.entity_id.clone())
    }

    pub fn is_pending(&self) -> bool {
        !self.synced
    }
}

/// 1回の push 試行後にキューへ書き戻す結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied,
    Conflicted,
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcomeUpdate {
    pub id: ChangeId,
    pub outcome: ChangeOutcome,
}

impl ChangeOutcomeUpdate {
    pub fn new(id: ChangeId, outcome: ChangeOutcome) -> Self {
        Self { id, outcome }
    }
}

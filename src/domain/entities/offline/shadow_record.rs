use crate::domain::value_objects::{EntityId, EntityKey, EntityName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// クライアントが把握しているサーバー側の最新状態
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShadowRecord {
    pub entity_name: EntityName,
    pub entity_id: EntityId,
    pub data: Value,
    pub version: i64,
    pub last_sync: DateTime<Utc>,
}

impl ShadowRecord {
    pub fn new(key: EntityKey, data: Value, version: i64, last_sync: DateTime<Utc>) -> Self {
        Self {
            entity_name: key.entity_name,
            entity_id: key.entity_id,
            data,
            version,
            last_sync,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_name.clone(), self.entity_id.clone())
    }
}

use crate::domain::value_objects::{EntityId, EntityKey, EntityName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub entity_name: EntityName,
    pub entity_id: EntityId,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftRecord {
    pub fn new(key: EntityKey, data: Value, now: DateTime<Utc>) -> Self {
        Self {
            entity_name: key.entity_name,
            entity_id: key.entity_id,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_name.clone(), self.entity_id.clone())
    }
}

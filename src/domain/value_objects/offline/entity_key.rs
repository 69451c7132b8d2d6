use super::{EntityId, EntityName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(entity_name, entity_id)` の複合キー
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_name: EntityName,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_name: EntityName, entity_id: EntityId) -> Self {
        Self {
            entity_name,
            entity_id,
        }
    }

    pub fn parse(entity_name: &str, entity_id: &str) -> Result<Self, String> {
        Ok(Self::new(
            EntityName::new(entity_name.to_string())?,
            EntityId::new(entity_id.to_string())?,
        ))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_name, self.entity_id)
    }
}

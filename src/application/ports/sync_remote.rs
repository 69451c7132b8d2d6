//! Request/response contract with the server of record.

use crate::domain::entities::offline::ChangeRecord;
use crate::domain::value_objects::{ChangeId, DeviceId, EntityId, EntityKey, EntityName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    pub entity_name: EntityName,
    pub entity_id: EntityId,
    pub payload: Value,
    pub version: i64,
}

impl RemoteChange {
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_name.clone(), self.entity_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub changes: Vec<RemoteChange>,
    pub server_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedChange {
    pub id: ChangeId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub entity_name: EntityName,
    pub entity_id: EntityId,
    pub server_data: Value,
    pub server_version: i64,
}

impl ConflictInfo {
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_name.clone(), self.entity_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PushResponse {
    pub applied: Vec<AppliedChange>,
    pub conflicts: Vec<ConflictInfo>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("server returned status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SyncRemote: Send + Sync {
    async fn pull(
        &self,
        device_id: &DeviceId,
        since: Option<DateTime<Utc>>,
    ) -> Result<PullResponse, TransportError>;

    async fn push(
        &self,
        device_id: &DeviceId,
        changes: &[ChangeRecord],
        last_known_server_ts: Option<DateTime<Utc>>,
    ) -> Result<PushResponse, TransportError>;
}

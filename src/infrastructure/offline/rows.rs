use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChangeRecordRow {
    pub seq: i64,
    pub id: String,
    pub entity_name: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub timestamp: i64,
    pub device_id: String,
    pub synced: bool,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub conflicted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShadowRecordRow {
    pub entity_name: String,
    pub entity_id: String,
    pub data: String,
    pub version: i64,
    pub last_sync: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DraftRecordRow {
    pub entity_name: String,
    pub entity_id: String,
    pub data: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CacheEntryRow {
    pub key: String,
    pub data: String,
    pub timestamp: i64,
    pub expires_at: Option<i64>,
    pub tags: String,
    pub size: i64,
    pub access_count: i64,
    pub last_accessed: i64,
}

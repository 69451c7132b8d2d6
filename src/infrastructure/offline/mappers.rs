use super::rows::{CacheEntryRow, ChangeRecordRow, DraftRecordRow, ShadowRecordRow};
use crate::domain::entities::offline::{CacheEntry, ChangeRecord, DraftRecord, ShadowRecord};
use crate::domain::value_objects::{
    CacheKey, ChangeId, ChangeOperation, DeviceId, EntityId, EntityName,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

pub fn millis_to_datetime(value: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| AppError::DeserializationError(format!("Invalid timestamp: {value}")))
}

pub fn parse_json(raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(raw).map_err(|err| AppError::DeserializationError(err.to_string()))
}

pub fn to_json(value: &Value) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|err| AppError::SerializationError(err.to_string()))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub fn domain_change_from_row(row: ChangeRecordRow) -> Result<ChangeRecord, AppError> {
    Ok(ChangeRecord {
        id: ChangeId::parse(&row.id).map_err(AppError::ValidationError)?,
        entity_name: EntityName::new(row.entity_name).map_err(AppError::ValidationError)?,
        entity_id: EntityId::new(row.entity_id).map_err(AppError::ValidationError)?,
        operation: ChangeOperation::try_from(row.operation.as_str())
            .map_err(AppError::DeserializationError)?,
        payload: parse_json(&row.payload)?,
        timestamp: millis_to_datetime(row.timestamp)?,
        device_id: DeviceId::new(row.device_id).map_err(AppError::ValidationError)?,
        synced: row.synced,
        retry_count: u32::try_from(row.retry_count).unwrap_or(u32::MAX),
        last_error: row.last_error,
        conflicted: row.conflicted,
    })
}

pub fn domain_shadow_from_row(row: ShadowRecordRow) -> Result<ShadowRecord, AppError> {
    Ok(ShadowRecord {
        entity_name: EntityName::new(row.entity_name).map_err(AppError::ValidationError)?,
        entity_id: EntityId::new(row.entity_id).map_err(AppError::ValidationError)?,
        data: parse_json(&row.data)?,
        version: row.version,
        last_sync: millis_to_datetime(row.last_sync)?,
    })
}

pub fn domain_draft_from_row(row: DraftRecordRow) -> Result<DraftRecord, AppError> {
    Ok(DraftRecord {
        entity_name: EntityName::new(row.entity_name).map_err(AppError::ValidationError)?,
        entity_id: EntityId::new(row.entity_id).map_err(AppError::ValidationError)?,
        data: parse_json(&row.data)?,
        created_at: millis_to_datetime(row.created_at)?,
        updated_at: millis_to_datetime(row.updated_at)?,
    })
}

pub fn domain_cache_entry_from_row(row: CacheEntryRow) -> Result<CacheEntry, AppError> {
    let tags: BTreeSet<String> = serde_json::from_str(&row.tags)
        .map_err(|err| AppError::DeserializationError(err.to_string()))?;

    Ok(CacheEntry {
        key: CacheKey::new(row.key).map_err(AppError::ValidationError)?,
        data: parse_json(&row.data)?,
        timestamp: millis_to_datetime(row.timestamp)?,
        expires_at: row.expires_at.map(millis_to_datetime).transpose()?,
        tags,
        size: to_u64(row.size),
        access_count: to_u64(row.access_count),
        last_accessed: millis_to_datetime(row.last_accessed)?,
    })
}

pub fn tags_to_json(tags: &BTreeSet<String>) -> Result<String, AppError> {
    serde_json::to_string(tags).map_err(|err| AppError::SerializationError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_row_with_unknown_operation_is_rejected() {
        let row = ChangeRecordRow {
            seq: 1,
            id: "device:1".into(),
            entity_name: "step-execution".into(),
            entity_id: "i1-s1".into(),
            operation: "merge".into(),
            payload: "{}".into(),
            timestamp: 0,
            device_id: "device".into(),
            synced: false,
            retry_count: 0,
            last_error: None,
            conflicted: false,
        };

        let err = domain_change_from_row(row).unwrap_err();
        assert!(matches!(err, AppError::DeserializationError(_)));
    }

    #[test]
    fn cache_row_tags_are_decoded() {
        let row = CacheEntryRow {
            key: "k".into(),
            data: "1".into(),
            timestamp: 10,
            expires_at: Some(20),
            tags: r#"["a","b"]"#.into(),
            size: 1,
            access_count: 3,
            last_accessed: 15,
        };

        let entry = domain_cache_entry_from_row(row).unwrap();
        assert!(entry.tags.contains("a") && entry.tags.contains("b"));
        assert_eq!(entry.expires_at.unwrap().timestamp_millis(), 20);
        assert_eq!(entry.access_count, 3);
    }
}

use super::mappers::{
    domain_change_from_row, domain_draft_from_row, domain_shadow_from_row, to_json,
};
use super::rows::{ChangeRecordRow, DraftRecordRow, ShadowRecordRow};
use crate::application::ports::offline_store::OfflinePersistence;
use crate::domain::entities::offline::{
    ChangeOutcome, ChangeOutcomeUpdate, ChangeRecord, DraftRecord, ShadowRecord,
};
use crate::domain::value_objects::{ChangeId, EntityKey, EntityName};
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

const CHANGE_COLUMNS: &str = "seq, id, entity_name, entity_id, operation, payload, timestamp, \
     device_id, synced, retry_count, last_error, conflicted";

/// sqlx/SQLite によるオフライン永続化
#[derive(Clone)]
pub struct SqliteOfflinePersistence {
    pool: Pool<Sqlite>,
}

impl SqliteOfflinePersistence {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl OfflinePersistence for SqliteOfflinePersistence {
    async fn append_change(&self, record: &ChangeRecord) -> Result<(), AppError> {
        let payload = to_json(&record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO change_queue (
                id, entity_name, entity_id, operation, payload,
                timestamp, device_id, synced, retry_count, last_error, conflicted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.entity_name.as_str())
        .bind(record.entity_id.as_str())
        .bind(record.operation.as_str())
        .bind(&payload)
        .bind(record.timestamp.timestamp_millis())
        .bind(record.device_id.as_str())
        .bind(record.synced)
        .bind(i64::from(record.retry_count))
        .bind(&record.last_error)
        .bind(record.conflicted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_change(&self, id: &ChangeId) -> Result<Option<ChangeRecord>, AppError> {
        let row = sqlx::query_as::<_, ChangeRecordRow>(&format!(
            "SELECT {CHANGE_COLUMNS} FROM change_queue WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(domain_change_from_row).transpose()
    }

    async fn list_pending_changes(&self) -> Result<Vec<ChangeRecord>, AppError> {
        let rows = sqlx::query_as::<_, ChangeRecordRow>(&format!(
            "SELECT {CHANGE_COLUMNS} FROM change_queue WHERE synced = 0 ORDER BY timestamp ASC, seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_change_from_row).collect()
    }

    async fn list_changes_for(&self, key: &EntityKey) -> Result<Vec<ChangeRecord>, AppError> {
        let rows = sqlx::query_as::<_, ChangeRecordRow>(&format!(
            "SELECT {CHANGE_COLUMNS} FROM change_queue \
             WHERE entity_name = ?1 AND entity_id = ?2 ORDER BY timestamp ASC, seq ASC"
        ))
        .bind(key.entity_name.as_str())
        .bind(key.entity_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_change_from_row).collect()
    }

    async fn count_pending_changes(&self) -> Result<u64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM change_queue WHERE synced = 0")
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn apply_change_outcomes(
        &self,
        updates: &[ChangeOutcomeUpdate],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for update in updates {
            // synced = 0 の条件で、同期済みレコードを巻き戻さない
            match &update.outcome {
                ChangeOutcome::Applied => {
                    sqlx::query(
                        "UPDATE change_queue SET synced = 1, last_error = NULL \
                         WHERE id = ?1 AND synced = 0",
                    )
                    .bind(update.id.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
                ChangeOutcome::Conflicted => {
                    sqlx::query(
                        "UPDATE change_queue SET synced = 1, conflicted = 1 \
                         WHERE id = ?1 AND synced = 0",
                    )
                    .bind(update.id.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
                ChangeOutcome::Rejected { error } => {
                    sqlx::query(
                        "UPDATE change_queue SET retry_count = retry_count + 1, last_error = ?1 \
                         WHERE id = ?2 AND synced = 0",
                    )
                    .bind(error)
                    .bind(update.id.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_changes(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM change_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_shadow(&self, record: &ShadowRecord) -> Result<bool, AppError> {
        let data = to_json(&record.data)?;

        let result = sqlx::query(
            r#"
            INSERT INTO shadow_records (entity_name, entity_id, data, version, last_sync)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_name, entity_id) DO UPDATE SET
                data = excluded.data,
                version = excluded.version,
                last_sync = excluded.last_sync
            WHERE excluded.version >= shadow_records.version
            "#,
        )
        .bind(record.entity_name.as_str())
        .bind(record.entity_id.as_str())
        .bind(&data)
        .bind(record.version)
        .bind(record.last_sync.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_shadow(&self, key: &EntityKey) -> Result<Option<ShadowRecord>, AppError> {
        let row = sqlx::query_as::<_, ShadowRecordRow>(
            r#"
            SELECT entity_name, entity_id, data, version, last_sync
            FROM shadow_records
            WHERE entity_name = ?1 AND entity_id = ?2
            "#,
        )
        .bind(key.entity_name.as_str())
        .bind(key.entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(domain_shadow_from_row).transpose()
    }

    async fn list_shadows(
        &self,
        entity_name: &EntityName,
    ) -> Result<Vec<ShadowRecord>, AppError> {
        let rows = sqlx::query_as::<_, ShadowRecordRow>(
            r#"
            SELECT entity_name, entity_id, data, version, last_sync
            FROM shadow_records
            WHERE entity_name = ?1
            ORDER BY entity_id ASC
            "#,
        )
        .bind(entity_name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_shadow_from_row).collect()
    }

    async fn save_draft(&self, record: &DraftRecord) -> Result<DraftRecord, AppError> {
        let data = to_json(&record.data)?;

        // 既存の created_at は保持する
        sqlx::query(
            r#"
            INSERT INTO drafts (entity_name, entity_id, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_name, entity_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.entity_name.as_str())
        .bind(record.entity_id.as_str())
        .bind(&data)
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.get_draft(&record.entity_key())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draft {}", record.entity_key())))
    }

    async fn get_draft(&self, key: &EntityKey) -> Result<Option<DraftRecord>, AppError> {
        let row = sqlx::query_as::<_, DraftRecordRow>(
            r#"
            SELECT entity_name, entity_id, data, created_at, updated_at
            FROM drafts
            WHERE entity_name = ?1 AND entity_id = ?2
            "#,
        )
        .bind(key.entity_name.as_str())
        .bind(key.entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(domain_draft_from_row).transpose()
    }

    async fn delete_draft(&self, key: &EntityKey) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM drafts WHERE entity_name = ?1 AND entity_id = ?2")
            .bind(key.entity_name.as_str())
            .bind(key.entity_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_drafts(&self, entity_name: &EntityName) -> Result<Vec<DraftRecord>, AppError> {
        let rows = sqlx::query_as::<_, DraftRecordRow>(
            r#"
            SELECT entity_name, entity_id, data, created_at, updated_at
            FROM drafts
            WHERE entity_name = ?1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(entity_name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(domain_draft_from_row).collect()
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

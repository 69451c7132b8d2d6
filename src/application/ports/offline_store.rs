use crate::domain::entities::offline::{
    ChangeOutcomeUpdate, ChangeRecord, DraftRecord, ShadowRecord,
};
use crate::domain::value_objects::{ChangeId, EntityKey, EntityName};
use crate::shared::error::AppError;
use async_trait::async_trait;

pub const META_DEVICE_ID: &str = "device_id";
pub const META_LAST_SYNC_TIME: &str = "last_sync_time";

/// 端末ローカルの永続ストア（変更キュー・シャドウ・下書き・メタデータ）
#[async_trait]
pub trait OfflinePersistence: Send + Sync {
    // 変更キュー
    async fn append_change(&self, record: &ChangeRecord) -> Result<(), AppError>;
    async fn get_change(&self, id: &ChangeId) -> Result<Option<ChangeRecord>, AppError>;
    /// 未同期レコードをキュー投入順で返す
    async fn list_pending_changes(&self) -> Result<Vec<ChangeRecord>, AppError>;
    async fn list_changes_for(&self, key: &EntityKey) -> Result<Vec<ChangeRecord>, AppError>;
    async fn count_pending_changes(&self) -> Result<u64, AppError>;
    /// push 結果を書き戻す。同期済みレコードには何もしない
    async fn apply_change_outcomes(&self, updates: &[ChangeOutcomeUpdate])
        -> Result<(), AppError>;
    async fn clear_changes(&self) -> Result<u64, AppError>;

    // シャドウ
    /// 保存済みより古いバージョンは無視し `false` を返す
    async fn upsert_shadow(&self, record: &ShadowRecord) -> Result<bool, AppError>;
    async fn get_shadow(&self, key: &EntityKey) -> Result<Option<ShadowRecord>, AppError>;
    async fn list_shadows(&self, entity_name: &EntityName)
        -> Result<Vec<ShadowRecord>, AppError>;

    // 下書き
    async fn save_draft(&self, record: &DraftRecord) -> Result<DraftRecord, AppError>;
    async fn get_draft(&self, key: &EntityKey) -> Result<Option<DraftRecord>, AppError>;
    async fn delete_draft(&self, key: &EntityKey) -> Result<bool, AppError>;
    async fn list_drafts(&self, entity_name: &EntityName) -> Result<Vec<DraftRecord>, AppError>;

    // メタデータ
    async fn get_meta(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_meta(&self, key: &str, value: &str) -> Result<(), AppError>;
}

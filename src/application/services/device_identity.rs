use crate::application::ports::offline_store::{OfflinePersistence, META_DEVICE_ID};
use crate::domain::value_objects::DeviceId;
use crate::shared::error::AppError;

/// 端末IDを読み込み、未作成なら生成して保存する
pub async fn load_or_create_device_id(
    persistence: &dyn OfflinePersistence,
) -> Result<DeviceId, AppError> {
    if let Some(stored) = persistence.get_meta(META_DEVICE_ID).await? {
        match DeviceId::new(stored) {
            Ok(device_id) => return Ok(device_id),
            Err(err) => {
                tracing::warn!(
                    target: "offline::device",
                    error = %err,
                    "stored device id is invalid; generating a new one"
                );
            }
        }
    }

    let device_id = DeviceId::generate();
    persistence
        .set_meta(META_DEVICE_ID, device_id.as_str())
        .await?;
    tracing::info!(target: "offline::device", device_id = %device_id, "generated device id");
    Ok(device_id)
}

pub mod cache_service;
pub mod change_queue_service;
pub mod device_identity;
pub mod draft_service;
mod sync_state;
pub mod sync_service;

pub use cache_service::{CacheOptions, CacheService};
pub use change_queue_service::ChangeQueueService;
pub use device_identity::load_or_create_device_id;
pub use draft_service::DraftService;
pub use sync_service::SyncService;
pub use sync_state::{SyncStateStore, MAX_SYNC_ERRORS};

pub mod cache_cleanup_job;
pub mod sync_scheduler;

pub use cache_cleanup_job::CacheCleanupJob;
pub use sync_scheduler::{SchedulerHandle, SyncScheduler};

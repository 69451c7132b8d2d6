pub mod cache_entry;
pub mod change_record;
pub mod draft_record;
pub mod shadow_record;
pub mod sync_report;
pub mod sync_status;

pub use cache_entry::{
    approximate_size, CacheCounters, CacheEntry, CacheStats, CacheUsage, CleanupReport,
};
pub use change_record::{ChangeOutcome, ChangeOutcomeUpdate, ChangeRecord};
pub use draft_record::DraftRecord;
pub use shadow_record::ShadowRecord;
pub use sync_report::{SkipReason, SyncOutcome, SyncReport};
pub use sync_status::{SyncPhase, SyncStatus};

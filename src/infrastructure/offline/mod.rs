pub mod mappers;
pub mod metrics;
pub mod rows;
pub mod sqlite_store;

pub use metrics::{SyncHealthMetrics, SyncHealthSnapshot, SyncOutcomeStatus};
pub use sqlite_store::SqliteOfflinePersistence;

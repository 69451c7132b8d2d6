pub mod ports;
pub mod services;

pub use services::{CacheService, ChangeQueueService, DraftService, SyncService};

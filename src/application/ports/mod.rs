pub mod cache_store;
pub mod offline_store;
pub mod sync_remote;

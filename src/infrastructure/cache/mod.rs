pub mod memory_cache;
pub mod sqlite_cache;

pub use memory_cache::MemoryCacheStore;
pub use sqlite_cache::SqliteCacheStore;

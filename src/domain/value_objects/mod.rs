pub mod offline;

pub use offline::{
    CacheKey, ChangeId, ChangeOperation, DeviceId, EntityId, EntityKey, EntityName,
};

pub mod cache_key;
pub mod change_id;
pub mod change_operation;
pub mod device_id;
pub mod entity_id;
pub mod entity_key;
pub mod entity_name;

pub use cache_key::CacheKey;
pub use change_id::ChangeId;
pub use change_operation::ChangeOperation;
pub use device_id::DeviceId;
pub use entity_id::EntityId;
pub use entity_key::EntityKey;
pub use entity_name::EntityName;

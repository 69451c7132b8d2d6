pub mod mocks;
pub mod offline_support;

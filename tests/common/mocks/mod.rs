pub mod mock_remote;

pub use mock_remote::InMemoryServer;

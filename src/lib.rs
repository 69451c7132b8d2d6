//! Offline-first change queue, read-through cache and sync engine.
//!
//! ローカル変更をキューに積み、接続時にサーバーと Pull → Push で同期する。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::sync_remote::{SyncRemote, TransportError};
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

/// ログ設定の初期化（`RUST_LOG` が優先）
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldsync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

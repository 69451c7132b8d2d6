use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// 定期同期の間隔（秒）
    pub sync_interval: u64,
    /// `None` の場合は再試行回数に上限を設けない
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// この回数以上連続で失敗すると unhealthy 扱い
    pub health_failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_ms: u64,
    pub max_size_bytes: u64,
    pub max_entries: u64,
    pub cleanup_interval: u64,
    /// 容量超過時に削除する割合
    pub eviction_ratio: f64,
    pub unhealthy_error_threshold: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/fieldsync.db".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            sync: SyncConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 30,
            max_retries: None,
            health_failure_threshold: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000, // 5 minutes
            max_size_bytes: 50 * 1024 * 1024, // 50MB
            max_entries: 1000,
            cleanup_interval: 60,
            eviction_ratio: 0.1,
            unhealthy_error_threshold: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FIELDSYNC_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.database.url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("FIELDSYNC_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u64::from(u32::MAX)) as u32;
        }

        // 同期設定
        if let Ok(v) = std::env::var("FIELDSYNC_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("FIELDSYNC_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_u64("FIELDSYNC_MAX_RETRIES") {
            cfg.sync.max_retries = if value == 0 {
                None
            } else {
                Some(value.min(u64::from(u32::MAX)) as u32)
            };
        }

        // キャッシュ設定
        if let Some(value) = env_u64("FIELDSYNC_CACHE_TTL_MS") {
            cfg.cache.default_ttl_ms = value.max(1);
        }
        if let Some(value) = env_u64("FIELDSYNC_CACHE_MAX_SIZE_BYTES") {
            cfg.cache.max_size_bytes = value;
        }
        if let Some(value) = env_u64("FIELDSYNC_CACHE_MAX_ENTRIES") {
            cfg.cache.max_entries = value;
        }
        if let Some(value) = env_u64("FIELDSYNC_CACHE_CLEANUP_INTERVAL_SECS") {
            cfg.cache.cleanup_interval = value.max(1);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.sync_interval == 0 {
            return Err("Sync interval must be greater than 0".to_string());
        }
        if self.sync.health_failure_threshold == 0 {
            return Err("Sync health_failure_threshold must be greater than 0".to_string());
        }
        if self.cache.max_size_bytes == 0 || self.cache.max_entries == 0 {
            return Err("Cache capacity limits must be greater than 0".to_string());
        }
        if self.cache.cleanup_interval == 0 {
            return Err("Cache cleanup_interval must be greater than 0".to_string());
        }
        if !(self.cache.eviction_ratio > 0.0 && self.cache.eviction_ratio <= 1.0) {
            return Err("Cache eviction_ratio must be within (0, 1]".to_string());
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

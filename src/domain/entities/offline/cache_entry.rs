use crate::domain::value_objects::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    /// シリアライズ後のおおよそのバイト数（容量計算専用）
    pub size: u64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        data: Value,
        tags: BTreeSet<String>,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let size = approximate_size(&data);
        Self {
            key,
            data,
            timestamp: now,
            expires_at,
            tags,
            size,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// `now <= expires_at` の間は有効
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now <= expires_at,
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

pub fn approximate_size(data: &Value) -> u64 {
    serde_json::to_vec(data)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

/// キャッシュ全体の集計値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub entries: u64,
    pub total_size: u64,
}

/// 永続化されるヒット/ミスカウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounters {
    pub hit_count: u64,
    pub miss_count: u64,
    pub last_cleanup: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: u64,
    pub total_size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub cleanup_errors: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired_removed: u64,
    pub evicted: u64,
    pub remaining_entries: u64,
    pub remaining_size: u64,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldsync::application::ports::sync_remote::{
    AppliedChange, ConflictInfo, PullResponse, PushResponse, RemoteChange, SyncRemote,
    TransportError,
};
use fieldsync::domain::entities::offline::ChangeRecord;
use fieldsync::domain::value_objects::{ChangeOperation, DeviceId, EntityKey};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ServerEntity {
    pub data: Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// 変更を順に適用するだけの簡易サーバー
#[derive(Default)]
pub struct InMemoryServer {
    entities: Mutex<HashMap<EntityKey, ServerEntity>>,
    locked: Mutex<HashSet<EntityKey>>,
    unreachable: AtomicBool,
    pushes: AtomicUsize,
}

#[allow(dead_code)]
impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// 他端末の更新を模して、このエンティティへの push を競合にする
    pub fn seed_conflicting(&self, key: EntityKey, data: Value, version: i64) {
        self.entities.lock().unwrap().insert(
            key.clone(),
            ServerEntity {
                data,
                version,
                updated_at: Utc::now(),
                deleted: false,
            },
        );
        self.locked.lock().unwrap().insert(key);
    }

    pub fn seed(&self, key: EntityKey, data: Value, version: i64) {
        self.entities.lock().unwrap().insert(
            key,
            ServerEntity {
                data,
                version,
                updated_at: Utc::now(),
                deleted: false,
            },
        );
    }

    pub fn entity(&self, key: &EntityKey) -> Option<ServerEntity> {
        self.entities.lock().unwrap().get(key).cloned()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(TransportError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SyncRemote for InMemoryServer {
    async fn pull(
        &self,
        _device_id: &DeviceId,
        since: Option<DateTime<Utc>>,
    ) -> Result<PullResponse, TransportError> {
        self.check_reachable()?;
        let entities = self.entities.lock().unwrap();
        let changes = entities
            .iter()
            .filter(|(_, entity)| since.map_or(true, |since| entity.updated_at > since))
            .map(|(key, entity)| RemoteChange {
                entity_name: key.entity_name.clone(),
                entity_id: key.entity_id.clone(),
                payload: entity.data.clone(),
                version: entity.version,
            })
            .collect();

        Ok(PullResponse {
            changes,
            server_ts: Utc::now(),
        })
    }

    async fn push(
        &self,
        _device_id: &DeviceId,
        changes: &[ChangeRecord],
        _last_known_server_ts: Option<DateTime<Utc>>,
    ) -> Result<PushResponse, TransportError> {
        self.check_reachable()?;
        self.pushes.fetch_add(1, Ordering::SeqCst);

        let locked = self.locked.lock().unwrap();
        let mut entities = self.entities.lock().unwrap();
        let mut response = PushResponse::default();

        for change in changes {
            let key = change.entity_key();
            if locked.contains(&key) {
                if let Some(entity) = entities.get(&key) {
                    let already_reported = response
                        .conflicts
                        .iter()
                        .any(|conflict| conflict.entity_key() == key);
                    if !already_reported {
                        response.conflicts.push(ConflictInfo {
                            entity_name: key.entity_name.clone(),
                            entity_id: key.entity_id.clone(),
                            server_data: entity.data.clone(),
                            server_version: entity.version,
                        });
                    }
                }
                continue;
            }

            let version = entities.get(&key).map_or(1, |entity| entity.version + 1);
            entities.insert(
                key,
                ServerEntity {
                    data: change.payload.clone(),
                    version,
                    updated_at: Utc::now(),
                    deleted: change.operation == ChangeOperation::Delete,
                },
            );
            response.applied.push(AppliedChange {
                id: change.id.clone(),
            });
        }

        Ok(response)
    }
}

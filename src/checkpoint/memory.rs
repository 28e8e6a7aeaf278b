//! 内存检查点存储
//!
//! 快照以 JSON 形式保存，读取时反序列化出独立副本；空闲超过保留时长（默认 45 分钟）的会话视为过期。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CheckpointError, CheckpointStore, SessionState};

struct Entry {
    snapshot: String,
    saved_at: Instant,
}

impl Entry {
    fn is_expired(&self, retention: Duration) -> bool {
        self.saved_at.elapsed() > retention
    }
}

pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<String, Entry>>,
    retention: Duration,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(45 * 60))
    }
}

impl MemoryCheckpointStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// 清理过期快照，返回清理数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(self.retention));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!(removed, "expired session checkpoints cleaned up");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError> {
        let snapshot = serde_json::to_string(state)?;
        self.entries.write().await.insert(
            session_id.to_string(),
            Entry {
                snapshot,
                saved_at: Instant::now(),
            },
        );
        tracing::debug!(session_id, phase = state.phase.name(), step = state.steps, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, CheckpointError> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(session_id) {
            Some(e) => e.is_expired(self.retention),
            None => return Ok(None),
        };
        if expired {
            entries.remove(session_id);
            tracing::info!(session_id, "session checkpoint expired");
            return Ok(None);
        }
        entries
            .get(session_id)
            .map(|e| serde_json::from_str(&e.snapshot))
            .transpose()
            .map_err(CheckpointError::from)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.entries.write().await.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryCheckpointStore::default();
        let state = SessionState::new("s1", "hello");
        store.save("s1", &state).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.load("other").await.unwrap().is_none());

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_loaded_state_is_an_independent_copy() {
        let store = MemoryCheckpointStore::default();
        let state = SessionState::new("s1", "hello");
        store.save("s1", &state).await.unwrap();

        let mut loaded = store.load("s1").await.unwrap().unwrap();
        loaded.replan_count = 9;
        assert_eq!(store.load("s1").await.unwrap().unwrap().replan_count, 0);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_dropped() {
        let store = MemoryCheckpointStore::new(Duration::from_millis(20));
        store.save("old", &SessionState::new("old", "a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.save("fresh", &SessionState::new("fresh", "b")).await.unwrap();

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.load("fresh").await.unwrap().is_some());
    }
}

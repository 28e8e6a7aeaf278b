//! SQLite 检查点存储（sqlx，需启用 `async-sqlite` feature）
//!
//! 每个会话一行 JSON 快照；updated_at 早于保留窗口的行视为过期。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{CheckpointError, CheckpointStore, SessionState};

impl From<sqlx::Error> for CheckpointError {
    fn from(e: sqlx::Error) -> Self {
        CheckpointError::Storage(e.to_string())
    }
}

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    retention: Duration,
}

impl SqliteCheckpointStore {
    pub async fn new(db_path: impl AsRef<Path>, retention: Duration) -> Result<Self, CheckpointError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let store = Self { pool, retention };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_checkpoints (
                session_id TEXT PRIMARY KEY,
                phase TEXT NOT NULL,
                step INTEGER NOT NULL,
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn cutoff(&self) -> i64 {
        chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX))
    }

    /// 删除过期快照，返回删除行数
    pub async fn cleanup_expired(&self) -> Result<u64, CheckpointError> {
        let result = sqlx::query("DELETE FROM session_checkpoints WHERE updated_at < ?")
            .bind(self.cutoff())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError> {
        let snapshot = serde_json::to_string(state)?;
        sqlx::query(
            "INSERT OR REPLACE INTO session_checkpoints (session_id, phase, step, state, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(state.phase.name())
        .bind(state.steps as i64)
        .bind(snapshot)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, CheckpointError> {
        let row = sqlx::query(
            "SELECT state FROM session_checkpoints WHERE session_id = ? AND updated_at >= ?",
        )
        .bind(session_id)
        .bind(self.cutoff())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let snapshot: String = row.get("state");
                Ok(Some(serde_json::from_str(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool, CheckpointError> {
        let result = sqlx::query("DELETE FROM session_checkpoints WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        let retention = Duration::from_secs(60);

        let mut state = SessionState::new("s1", "hello");
        state.replan_count = 2;
        {
            let store = SqliteCheckpointStore::new(&path, retention).await.unwrap();
            store.save("s1", &state).await.unwrap();
        }

        let store = SqliteCheckpointStore::new(&path, retention).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.delete("s1").await.unwrap());
        assert!(store.load("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_expires_by_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::new(dir.path().join("c.db"), Duration::from_millis(10))
            .await
            .unwrap();
        store.save("s1", &SessionState::new("s1", "x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.load("s1").await.unwrap().is_none());
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
    }
}

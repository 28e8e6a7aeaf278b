//! 检查点：按会话保存 / 恢复 SessionState
//!
//! 存储只保存每个会话的最新快照；同一会话的写入由 Orchestrator 串行化，不同会话之间无锁依赖。

pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod state;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCheckpointStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteCheckpointStore;
pub use state::{Phase, SessionState, SubgraphState};

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checkpoint storage failed: {0}")]
    Storage(String),
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 覆盖保存会话的最新快照
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError>;

    /// 读取快照；不存在或已过期返回 None
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, CheckpointError>;

    /// 删除快照，返回是否存在
    async fn delete(&self, session_id: &str) -> Result<bool, CheckpointError>;
}

//! TodoTask：任务列表中的单个任务
//!
//! 失败的任务永远不会被删除，只做状态迁移；failure_count 只在迁入 retry / failed 时递增。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待执行
    Pending,
    /// 正在执行（同一会话至多一个）
    InProgress,
    /// 已完成
    Completed,
    /// 失败（终态，等待重新规划）
    Failed,
    /// 可恢复失败，等待重试
    Retry,
}

impl TaskStatus {
    /// 终态：completed 或 failed
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 可被调度：pending 或 retry
    pub fn is_executable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retry)
    }

    /// 迁入该状态是否计为一次失败
    pub fn counts_as_failure(self) -> bool {
        matches!(self, TaskStatus::Retry | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retry => "retry",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态字符串解析失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown task status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    /// 宽松解析 Planner 输出的状态（大小写不敏感，兼容 finished / in-progress 等写法）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "running" => Ok(TaskStatus::InProgress),
            "completed" | "finished" | "done" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "retry" => Ok(TaskStatus::Retry),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// 待办任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoTask {
    /// 任务唯一 ID（列表生命周期内唯一）
    pub id: String,
    /// 任务描述（供 Reasoner 与人工查看）
    pub description: String,
    /// 路由到的能力名（capability 路由表的 key）
    pub assigned_capability: String,
    pub status: TaskStatus,
    /// Planner 指定的执行顺序
    pub order: i64,
    pub failure_count: u32,
    /// 最近一次成功输出
    #[serde(default)]
    pub result: Option<String>,
    /// 最近一次失败原因
    #[serde(default)]
    pub last_error: Option<String>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
    /// 完成时间
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl TodoTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        assigned_capability: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assigned_capability: assigned_capability.into(),
            status: TaskStatus::Pending,
            order,
            failure_count: 0,
            result: None,
            last_error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        }
    }

    /// 生成任务 ID：task_<uuid 前 8 位>
    pub fn generate_id() -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("task_{}", &uuid[..8])
    }

    /// 状态迁移；迁入 retry / failed 且与原状态不同时递增 failure_count
    pub fn transition(&mut self, status: TaskStatus) {
        if status.counts_as_failure() && status != self.status {
            self.failure_count += 1;
        }
        if status == TaskStatus::Completed {
            self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        }
        self.status = status;
    }

    /// 一行摘要：[id] description (status) -> capability
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] #{} {} ({}, failures={}) -> {}",
            self.id, self.order, self.description, self.status, self.failure_count, self.assigned_capability
        )
    }
}

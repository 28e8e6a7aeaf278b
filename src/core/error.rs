//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：可归类为任务失败的错误被吸收为 retry / replan 状态迁移，
//! 其余错误上抛给 Orchestrator，由它生成面向用户的失败总结。

use std::time::Duration;

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::llm::ReasonerError;
use crate::todo::{DiffError, TodoError};

/// 任务失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 暂时性失败（工具超时、网络抖动），原能力重试
    Recoverable,
    /// 结构性失败（目标资源不存在、能力无法完成），交给 Planner 重新规划
    Structural,
}

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Planner 输出无法解析或违反 diff 约束（自我纠错耗尽后为致命错误）
    #[error("Malformed plan diff: {0}")]
    MalformedDiff(#[from] DiffError),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Task {task_id} failed (recoverable): {reason}")]
    RecoverableTaskFailure { task_id: String, reason: String },

    #[error("Task {task_id} failed (structural): {reason}")]
    StructuralTaskFailure { task_id: String, reason: String },

    #[error("Reasoner unavailable: {0}")]
    ReasonerUnavailable(#[from] ReasonerError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Step budget of {0} exceeded")]
    StepBudgetExceeded(usize),

    #[error("Replan limit of {0} exceeded")]
    ReplanLimitExceeded(u32),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid task state: {0}")]
    InvalidState(#[from] TodoError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl OrchestratorError {
    /// 能吸收为任务失败的错误返回其分类，其余返回 None（上抛）
    pub fn task_failure_kind(&self) -> Option<FailureKind> {
        match self {
            OrchestratorError::ToolExecution(_) | OrchestratorError::RecoverableTaskFailure { .. } => {
                Some(FailureKind::Recoverable)
            }
            OrchestratorError::StructuralTaskFailure { .. } | OrchestratorError::UnknownCapability(_) => {
                Some(FailureKind::Structural)
            }
            _ => None,
        }
    }
}

/// 任务失败后的处理：只有重试与重新规划两种
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// 退避后由同一能力重试当前任务
    RetryTask { delay: Duration },
    /// 标记失败并交给 Planner 重新规划
    Replan { reason: String },
}

/// 恢复引擎对上抛错误给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将纠错提示注入下一轮，让 Reasoner 重新输出（如 diff 格式错误）
    RetryWithPrompt(String),
    /// 终止当前运行，输出失败总结
    Abort,
}

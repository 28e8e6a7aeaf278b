//! Plan Diff：Planner 输出的增量计划及其应用
//!
//! 只允许 add（追加任务）与 modify（仅改状态），绝不删除任务，保证执行历史可审计。
//! 应用是原子的：任何一项校验失败都不会修改原列表。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::list::{TodoError, TodoList};
use super::task::{TaskStatus, TodoTask};
use crate::llm::extract_json_block;

/// 新任务描述（字段兼容 assignedAgent / assignedCapability 等写法）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// 可选：Planner 指定的 ID，未指定时自动生成
    #[serde(default, alias = "taskId", alias = "uniqueId")]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "assignedCapability",
        alias = "assigned_capability",
        alias = "assignedAgent",
        alias = "capability"
    )]
    pub assigned_capability: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            assigned_capability: Some(capability.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// 状态更新（仅状态）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(alias = "taskId", alias = "uniqueId")]
    pub id: String,
    pub status: String,
}

impl StatusUpdate {
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            status: status.as_str().to_string(),
        }
    }
}

/// Planner 输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    #[serde(default)]
    pub add: Vec<TaskSpec>,
    #[serde(default)]
    pub modify: Vec<StatusUpdate>,
    /// 仅用于识别并拒绝删除请求
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<serde_json::Value>,
}

impl PlanDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.modify.is_empty() && self.delete.is_empty()
    }
}

/// Diff 格式或语义错误（MalformedDiffError）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("planner output is not a valid plan diff: {0}")]
    Parse(String),

    #[error("modify refers to unknown task '{0}'")]
    UnknownTask(String),

    #[error("add[{index}] is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("plan diff may not delete tasks ({0} delete entries)")]
    DeleteNotAllowed(usize),

    #[error("add introduces duplicate task id '{0}'")]
    DuplicateId(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(#[from] TodoError),
}

/// 从 Planner 文本输出中解析 PlanDiff（支持 ```json 代码块或夹杂说明文字）
pub fn parse_plan_diff(output: &str) -> Result<PlanDiff, DiffError> {
    let json = extract_json_block(output)
        .ok_or_else(|| DiffError::Parse("no JSON object found".to_string()))?;
    serde_json::from_str(json).map_err(|e| DiffError::Parse(format!("{e}: {json}")))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 将 diff 应用到列表，返回新列表；原列表不变
pub fn apply(diff: &PlanDiff, list: &TodoList) -> Result<TodoList, DiffError> {
    if !diff.delete.is_empty() {
        return Err(DiffError::DeleteNotAllowed(diff.delete.len()));
    }

    let mut next = list.clone();

    for update in &diff.modify {
        if !next.contains(&update.id) {
            return Err(DiffError::UnknownTask(update.id.clone()));
        }
        let status: TaskStatus = update
            .status
            .parse()
            .map_err(|_| DiffError::InvalidStatus(update.status.clone()))?;
        next.set_status(&update.id, status)?;
    }

    for (index, spec) in diff.add.iter().enumerate() {
        let description = non_empty(&spec.description).ok_or(DiffError::MissingField {
            index,
            field: "description",
        })?;
        let capability = non_empty(&spec.assigned_capability).ok_or(DiffError::MissingField {
            index,
            field: "assignedCapability",
        })?;
        let status = match non_empty(&spec.status) {
            Some(s) => s
                .parse::<TaskStatus>()
                .map_err(|_| DiffError::InvalidStatus(s.to_string()))?,
            None => TaskStatus::Pending,
        };
        let id = match non_empty(&spec.id) {
            Some(id) => id.to_string(),
            None => loop {
                let candidate = TodoTask::generate_id();
                if !next.contains(&candidate) {
                    break candidate;
                }
            },
        };
        let order = spec
            .order
            .unwrap_or_else(|| next.max_order().map(|m| m + 1).unwrap_or(1));

        next.insert(TodoTask::new(id.clone(), description, capability, order))
            .map_err(|_| DiffError::DuplicateId(id.clone()))?;
        if status != TaskStatus::Pending {
            next.set_status(&id, status)?;
        }
        tracing::debug!(task_id = %id, order, %status, "plan diff added task");
    }

    tracing::info!(
        added = diff.add.len(),
        modified = diff.modify.len(),
        total = next.len(),
        "plan diff applied"
    );
    Ok(next)
}

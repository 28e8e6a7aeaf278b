//! TodoList：按 order 排序的任务集合
//!
//! 纯数据容器，由单个会话的编排循环独占，不做并发修改。
//! 同 order 的任务按插入顺序排列；任何时刻至多一个任务处于 in_progress。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::{TaskStatus, TodoTask};

/// TodoList 操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Task {running} is already in progress, cannot start {requested}")]
    AlreadyInProgress { running: String, requested: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    tasks: Vec<TodoTask>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 按执行顺序遍历
    pub fn tasks(&self) -> &[TodoTask] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&TodoTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TodoTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn max_order(&self) -> Option<i64> {
        self.tasks.iter().map(|t| t.order).max()
    }

    /// 插入任务，保持 order 升序；同 order 时排在已有任务之后
    pub fn insert(&mut self, task: TodoTask) -> Result<(), TodoError> {
        if self.contains(&task.id) {
            return Err(TodoError::DuplicateId(task.id));
        }
        let pos = self
            .tasks
            .iter()
            .position(|t| t.order > task.order)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(pos, task);
        Ok(())
    }

    /// order 最小的 pending / retry 任务
    pub fn next_executable(&self) -> Option<&TodoTask> {
        self.tasks.iter().find(|t| t.status.is_executable())
    }

    pub fn in_progress(&self) -> Option<&TodoTask> {
        self.tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
    }

    /// 所有任务均为 completed 或 failed（空列表视为 true）
    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// 失败任务占比
    pub fn failed_ratio(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        self.count(TaskStatus::Failed) as f64 / self.tasks.len() as f64
    }

    /// 状态迁移：保证至多一个 in_progress，失败计数由 TodoTask::transition 维护
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<&TodoTask, TodoError> {
        if status == TaskStatus::InProgress {
            if let Some(running) = self.in_progress() {
                if running.id != id {
                    return Err(TodoError::AlreadyInProgress {
                        running: running.id.clone(),
                        requested: id.to_string(),
                    });
                }
            }
        }
        let task = self
            .get_mut(id)
            .ok_or_else(|| TodoError::TaskNotFound(id.to_string()))?;
        task.transition(status);
        Ok(task)
    }

    /// 人类可读的状态表（拼入 Planner / Scheduler / Summary 的 prompt）
    pub fn summary(&self) -> String {
        if self.tasks.is_empty() {
            return "(no tasks)".to_string();
        }
        let mut s = format!(
            "Tasks: {} total, {} completed, {} failed, {} pending/retry\n",
            self.tasks.len(),
            self.count(TaskStatus::Completed),
            self.count(TaskStatus::Failed),
            self.tasks.iter().filter(|t| t.status.is_executable()).count(),
        );
        for t in &self.tasks {
            s.push_str("- ");
            s.push_str(&t.summary_line());
            if let Some(err) = &t.last_error {
                s.push_str(&format!(" | last error: {err}"));
            }
            s.push('\n');
        }
        s
    }
}

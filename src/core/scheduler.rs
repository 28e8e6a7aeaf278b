//! 调度器：基于 (TodoList, 上一次执行结果) 的路由状态机
//!
//! - 无结果：选出 order 最小的 pending / retry 任务，标记 in_progress 并路由到其能力
//! - 成功：标记 completed，继续下一个任务；没有可执行任务时路由到 Summary
//! - 可恢复失败且未达上限：标记 retry，退避后由同一能力重试
//! - 结构性失败或达到上限：标记 failed，携带 ReplanRequest 交给 Planner
//!
//! 调度器从不自行调整任务顺序，只有 Planner 能通过 diff 改变计划。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SchedulerSection;
use crate::core::recovery::{duration_millis, linear_backoff, RecoveryEngine};
use crate::core::{FailureAction, FailureKind, OrchestratorError};
use crate::todo::{TaskStatus, TodoError, TodoList, TodoTask};

/// 能力执行一个任务后的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success {
        task_id: String,
        output: String,
    },
    Failure {
        task_id: String,
        failure: FailureKind,
        reason: String,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            TaskOutcome::Success { task_id, .. } | TaskOutcome::Failure { task_id, .. } => task_id,
        }
    }
}

/// 交给 Planner 的结构化重新规划请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplanRequest {
    pub failed_task_id: String,
    pub reason: String,
    pub suggested_direction: String,
}

impl ReplanRequest {
    pub fn to_prompt_section(&self) -> String {
        format!(
            "## Replan request\nFailed task: {}\nReason: {}\nSuggested direction: {}\n",
            self.failed_task_id, self.reason, self.suggested_direction
        )
    }
}

/// 路由到某个能力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task_id: String,
    pub capability: String,
    pub description: String,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
    /// 执行前等待
    pub backoff: Duration,
    /// 当前任务表摘要
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Dispatch(Dispatch),
    Replan(ReplanRequest),
    Summarize,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    recovery: RecoveryEngine,
}

impl Scheduler {
    pub fn new(config: &SchedulerSection) -> Self {
        Self {
            recovery: RecoveryEngine::new(config),
        }
    }

    /// 处理上一次结果并给出下一步路由；会原地修改任务状态
    pub fn decide(
        &self,
        list: &mut TodoList,
        outcome: Option<TaskOutcome>,
    ) -> Result<Decision, OrchestratorError> {
        match outcome {
            None => self.select_next(list),
            Some(TaskOutcome::Success { task_id, output }) => {
                list.set_status(&task_id, TaskStatus::Completed)?;
                if let Some(task) = list.get_mut(&task_id) {
                    task.result = Some(output);
                }
                tracing::info!(task_id = %task_id, "task completed");
                self.select_next(list)
            }
            Some(TaskOutcome::Failure {
                task_id,
                failure,
                reason,
            }) => self.on_failure(list, &task_id, failure, reason),
        }
    }

    fn on_failure(
        &self,
        list: &mut TodoList,
        task_id: &str,
        failure: FailureKind,
        reason: String,
    ) -> Result<Decision, OrchestratorError> {
        let before = list
            .get(task_id)
            .cloned()
            .ok_or_else(|| TodoError::TaskNotFound(task_id.to_string()))?;
        let action = self
            .recovery
            .handle_failure(&before, failure, &reason, list.failed_ratio());
        if let Some(task) = list.get_mut(task_id) {
            task.last_error = Some(reason.clone());
        }

        match action {
            FailureAction::RetryTask { delay } => {
                let task = list.set_status(task_id, TaskStatus::Retry)?;
                tracing::warn!(
                    task_id,
                    failure_count = task.failure_count,
                    delay_ms = duration_millis(delay),
                    "task failed ({reason}), retrying"
                );
                list.set_status(task_id, TaskStatus::InProgress)?;
                Ok(Decision::Dispatch(self.dispatch_for(list, task_id, delay)?))
            }
            FailureAction::Replan { reason: why } => {
                let task = list.set_status(task_id, TaskStatus::Failed)?;
                tracing::warn!(
                    task_id,
                    failure_count = task.failure_count,
                    "task failed, escalating to planner: {why}"
                );
                let suggested_direction = suggest_direction(&before, failure, self.recovery.retry_limit());
                Ok(Decision::Replan(ReplanRequest {
                    failed_task_id: task_id.to_string(),
                    reason: why,
                    suggested_direction,
                }))
            }
        }
    }

    fn select_next(&self, list: &mut TodoList) -> Result<Decision, OrchestratorError> {
        // 恢复自检查点时可能已有进行中的任务
        if let Some(running) = list.in_progress().map(|t| t.id.clone()) {
            return Ok(Decision::Dispatch(self.dispatch_for(list, &running, Duration::ZERO)?));
        }
        let Some(next) = list.next_executable().cloned() else {
            tracing::info!(
                completed = list.count(TaskStatus::Completed),
                failed = list.count(TaskStatus::Failed),
                "no executable tasks left, routing to summary"
            );
            return Ok(Decision::Summarize);
        };
        let backoff = if next.status == TaskStatus::Retry {
            linear_backoff(
                next.failure_count.max(1),
                self.recovery.base_delay(),
                self.recovery.max_delay(),
            )
        } else {
            Duration::ZERO
        };
        list.set_status(&next.id, TaskStatus::InProgress)?;
        tracing::info!(task_id = %next.id, capability = %next.assigned_capability, "task dispatched");
        Ok(Decision::Dispatch(self.dispatch_for(list, &next.id, backoff)?))
    }

    fn dispatch_for(
        &self,
        list: &TodoList,
        task_id: &str,
        backoff: Duration,
    ) -> Result<Dispatch, OrchestratorError> {
        let task = list
            .get(task_id)
            .ok_or_else(|| TodoError::TaskNotFound(task_id.to_string()))?;
        Ok(Dispatch {
            task_id: task.id.clone(),
            capability: task.assigned_capability.clone(),
            description: task.description.clone(),
            attempt: task.failure_count + 1,
            backoff,
            context: list.summary(),
        })
    }
}

fn suggest_direction(task: &TodoTask, failure: FailureKind, retry_limit: u32) -> String {
    match failure {
        FailureKind::Structural => format!(
            "Task '{}' cannot be completed by '{}' as specified; add a replacement task with a different approach or capability.",
            task.description, task.assigned_capability
        ),
        FailureKind::Recoverable => format!(
            "Task '{}' kept failing after {} attempts; split it into smaller steps or route it to another capability.",
            task.description, retry_limit
        ),
    }
}

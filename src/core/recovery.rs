//! 错误恢复引擎
//!
//! 根据任务失败分类、失败次数与列表整体失败率返回 FailureAction，
//! 供 Scheduler 决定重试还是重新规划；Planner 与 Orchestrator 用它处理上抛的错误。

use std::time::Duration;

use crate::config::SchedulerSection;
use crate::core::{FailureAction, FailureKind, OrchestratorError, RecoveryAction};
use crate::todo::TodoTask;

/// 毫秒数，超出 u64 时饱和
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// 线性退避：attempt * base，封顶 cap
pub fn linear_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    base.saturating_mul(attempt).min(cap)
}

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    retry_limit: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_failure_ratio: f64,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(&SchedulerSection::default())
    }
}

impl RecoveryEngine {
    pub fn new(config: &SchedulerSection) -> Self {
        Self {
            retry_limit: config.retry_limit.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            max_failure_ratio: config.max_failure_ratio,
        }
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// 任务失败后的动作
    ///
    /// task 为失败前的快照：本次失败计入后 failure_count 仍低于 retry_limit
    /// 且失败可恢复时重试，否则重新规划。开启失败率阈值时，达到阈值的可恢复失败也重新规划。
    pub fn handle_failure(
        &self,
        task: &TodoTask,
        kind: FailureKind,
        reason: &str,
        failed_ratio: f64,
    ) -> FailureAction {
        let failures = task.failure_count + 1;
        if kind == FailureKind::Structural {
            return FailureAction::Replan {
                reason: format!("structural failure: {reason}"),
            };
        }
        if failures >= self.retry_limit {
            return FailureAction::Replan {
                reason: format!("retry limit {} reached: {reason}", self.retry_limit),
            };
        }
        if self.max_failure_ratio > 0.0 && failed_ratio >= self.max_failure_ratio {
            return FailureAction::Replan {
                reason: format!(
                    "{:.0}% of tasks have failed: {reason}",
                    failed_ratio * 100.0
                ),
            };
        }
        FailureAction::RetryTask {
            delay: linear_backoff(failures, self.base_delay, self.max_delay),
        }
    }

    /// 上抛错误的动作：diff 格式错误给出纠错提示，其余终止
    pub fn handle_error(&self, err: &OrchestratorError, previous_output: &str) -> RecoveryAction {
        match err {
            OrchestratorError::MalformedDiff(e) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous output could not be applied as a plan diff.\n\
                 Error: {e}\n\
                 Previous output:\n{previous_output}\n\n\
                 Reply with exactly one JSON object of the form \
                 {{\"add\": [{{\"description\": \"...\", \"assignedCapability\": \"...\"}}], \
                 \"modify\": [{{\"id\": \"...\", \"status\": \"pending|completed|failed\"}}]}}. \
                 Tasks can never be deleted; only use ids that exist in the task list."
            )),
            _ => RecoveryAction::Abort,
        }
    }
}

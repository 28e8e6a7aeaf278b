//! Planner：调用 Reasoner 生成 / 修订任务列表
//!
//! Reasoner 输出 PlanDiff（add / modify），经 diff 应用器得到新列表。
//! 输出无法解析或违反约束时，把原输出与错误拼入纠错提示重新请求，超过次数后返回 MalformedDiff。

use std::sync::Arc;

use crate::core::recovery::RecoveryEngine;
use crate::core::scheduler::ReplanRequest;
use crate::core::{OrchestratorError, RecoveryAction};
use crate::llm::Reasoner;
use crate::memory::{first_user_message, recent, Message};
use crate::todo::{apply, parse_plan_diff, TodoList};

/// 传给 Reasoner 的最近消息条数
const CONTEXT_MESSAGES: usize = 20;

const DEFAULT_INSTRUCTIONS: &str = "You are the planner of a multi-step assistant. \
Break the user's goal into an ordered list of tasks, each handled by one capability.";

const DIFF_FORMAT: &str = "Reply with one JSON plan diff:\n\
{\"add\": [{\"description\": \"...\", \"assignedCapability\": \"<capability>\", \"order\": <optional int>}],\n \
\"modify\": [{\"id\": \"<existing task id>\", \"status\": \"pending|completed|failed\"}]}\n\
Tasks can never be deleted. When replanning, add replacement tasks instead of editing failed ones.";

pub struct Planner {
    reasoner: Arc<dyn Reasoner>,
    instructions: String,
    capabilities: Vec<String>,
    correction_attempts: u32,
    recovery: RecoveryEngine,
}

impl Planner {
    pub fn new(reasoner: Arc<dyn Reasoner>, capabilities: Vec<String>) -> Self {
        Self {
            reasoner,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            capabilities,
            correction_attempts: 3,
            recovery: RecoveryEngine::default(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// 解析失败后的纠错重试次数
    pub fn with_correction_attempts(mut self, attempts: u32) -> Self {
        self.correction_attempts = attempts;
        self
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    fn system_prompt(&self, todo: &TodoList, messages: &[Message], replan: Option<&ReplanRequest>) -> String {
        let mut prompt = format!(
            "{}\n\n## Available capabilities\n{}\n\n## User request\n{}\n\n## Current tasks\n{}\n\n",
            self.instructions,
            self.capabilities.join(", "),
            first_user_message(messages).unwrap_or(""),
            todo.summary()
        );
        if let Some(req) = replan {
            prompt.push_str(&req.to_prompt_section());
            prompt.push('\n');
        }
        prompt.push_str(DIFF_FORMAT);
        prompt
    }

    /// 生成计划或在失败后重新规划，返回应用 diff 后的新列表（原列表不变）
    pub async fn plan(
        &self,
        todo: &TodoList,
        messages: &[Message],
        replan: Option<&ReplanRequest>,
    ) -> Result<TodoList, OrchestratorError> {
        let base = self.system_prompt(todo, messages, replan);
        let context = recent(messages, CONTEXT_MESSAGES);
        let mut prompt = base.clone();
        let mut corrections = 0;

        loop {
            let output = self.reasoner.infer(&prompt, context).await?;
            let err = match parse_plan_diff(&output).and_then(|diff| apply(&diff, todo)) {
                Ok(next) => {
                    tracing::info!(
                        tasks = next.len(),
                        replan = replan.is_some(),
                        corrections,
                        "plan updated"
                    );
                    return Ok(next);
                }
                Err(e) => OrchestratorError::MalformedDiff(e),
            };

            if corrections >= self.correction_attempts {
                tracing::error!(corrections, "planner output still malformed: {err}");
                return Err(err);
            }
            corrections += 1;
            match self.recovery.handle_error(&err, &output) {
                RecoveryAction::RetryWithPrompt(hint) => {
                    tracing::warn!(attempt = corrections, "malformed plan diff ({err}), asking planner to correct");
                    prompt = format!("{base}\n\n{hint}");
                }
                _ => return Err(err),
            }
        }
    }
}

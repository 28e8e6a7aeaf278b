//! Summary：汇总任务结果，生成最终回复

use std::sync::Arc;

use crate::core::OrchestratorError;
use crate::llm::Reasoner;
use crate::memory::{first_user_message, Message};
use crate::todo::{TaskStatus, TodoList};

const DEFAULT_INSTRUCTIONS: &str = "You write the final answer for the user based on the results \
of the tasks below. Mention tasks that failed and what that means for the user.";

pub struct Summarizer {
    reasoner: Arc<dyn Reasoner>,
    instructions: String,
}

impl Summarizer {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            reasoner,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub async fn summarize(&self, todo: &TodoList, messages: &[Message]) -> Result<String, OrchestratorError> {
        let prompt = format!(
            "{}\n\n## User request\n{}\n\n## Task results\n{}",
            self.instructions,
            first_user_message(messages).unwrap_or(""),
            task_results(todo)
        );
        let answer = self.reasoner.infer(&prompt, messages).await?;
        Ok(answer.trim().to_string())
    }
}

fn task_results(todo: &TodoList) -> String {
    if todo.is_empty() {
        return "(no tasks were planned)\n".to_string();
    }
    let mut s = String::new();
    for t in todo.tasks() {
        let detail = match t.status {
            TaskStatus::Completed => t.result.clone().unwrap_or_default(),
            _ => t.last_error.clone().unwrap_or_default(),
        };
        s.push_str(&format!("- {} [{}]: {}\n", t.description, t.status, detail));
    }
    s
}

/// 无法调用 Reasoner 时的失败说明（不依赖 Reasoner）
pub fn failure_summary(todo: &TodoList, reason: &str) -> String {
    let mut s = format!("Sorry, I could not finish this request: {reason}.\n");
    let done: Vec<_> = todo
        .tasks()
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();
    if !done.is_empty() {
        s.push_str("Completed so far:\n");
        for t in done {
            s.push_str(&format!("- {}: {}\n", t.description, t.result.as_deref().unwrap_or("done")));
        }
    }
    let failed = todo.count(TaskStatus::Failed);
    if failed > 0 {
        s.push_str(&format!("{failed} task(s) failed.\n"));
    }
    s
}

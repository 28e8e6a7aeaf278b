//! 工具循环能力：一个任务内的有界推理 / 工具调用循环
//!
//! 每一轮 Reasoner 回复一条 JSON 指令：
//! - `{"tool_calls": [{"name": "...", "args": {...}}]}` 或单个 `{"tool": "...", "args": {...}}`：分发工具，观察结果后进入下一轮
//! - `{"final": "..."}` 或纯文本：任务完成
//! - `{"ask_user": "..."}`：暂停等待人工输入
//! - `{"fail": {"reason": "...", "structural": true}}`：任务失败
//!
//! 轮数达到 max_iterations 视为可恢复失败，交给调度器重试。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::checkpoint::SubgraphState;
use crate::core::OrchestratorError;
use crate::llm::{extract_json_block, Reasoner};
use crate::memory::Message;
use crate::react::capability::{Capability, CapabilityContext, CapabilityOutcome};
use crate::tools::{args_preview, ExecutionContext, ToolCall, ToolDispatcher};

/// 拼 prompt 时带上的最近工具记录条数
const HISTORY_IN_PROMPT: usize = 10;

const PROTOCOL: &str = "Reply with exactly one JSON object:\n\
- {\"tool_calls\": [{\"name\": \"<tool>\", \"args\": {...}}]} to run tools\n\
- {\"final\": \"<result>\"} when the task is done\n\
- {\"ask_user\": \"<question>\"} if you need information only the user can give\n\
- {\"fail\": {\"reason\": \"<why>\", \"structural\": true|false}} if the task cannot be done \
(structural = retrying will not help)";

/// Reasoner 的单轮指令
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    ToolCalls(Vec<ToolCall>),
    Final(String),
    AskUser(String),
    Fail { reason: String, structural: bool },
}

#[derive(Debug, Deserialize)]
struct RawFail {
    reason: String,
    #[serde(default)]
    structural: bool,
}

#[derive(Debug, Deserialize)]
struct RawDirective {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: serde_json::Value,
    #[serde(default, rename = "final")]
    final_answer: Option<String>,
    #[serde(default)]
    ask_user: Option<String>,
    #[serde(default)]
    fail: Option<RawFail>,
}

/// 解析 Reasoner 回复；不含可识别指令的回复按最终结果处理
pub fn parse_directive(reply: &str) -> Directive {
    let text = reply.trim();
    let Some(json) = extract_json_block(text) else {
        return Directive::Final(text.to_string());
    };
    let Ok(raw) = serde_json::from_str::<RawDirective>(json) else {
        return Directive::Final(text.to_string());
    };

    if let Some(fail) = raw.fail {
        return Directive::Fail {
            reason: fail.reason,
            structural: fail.structural,
        };
    }
    if let Some(question) = raw.ask_user {
        return Directive::AskUser(question);
    }
    let mut calls = raw.tool_calls;
    if let Some(tool) = raw.tool.filter(|t| !t.is_empty()) {
        calls.push(ToolCall::new(tool, raw.args));
    }
    if !calls.is_empty() {
        for call in &mut calls {
            if call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
        }
        return Directive::ToolCalls(calls);
    }
    Directive::Final(raw.final_answer.unwrap_or_else(|| text.to_string()))
}

pub struct ToolLoopCapability {
    name: String,
    instructions: String,
    reasoner: Arc<dyn Reasoner>,
    dispatcher: Arc<ToolDispatcher>,
    /// 可用工具说明（通常为 ToolRegistry::to_schema_json）
    tool_catalog: String,
    max_iterations: usize,
}

impl ToolLoopCapability {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        reasoner: Arc<dyn Reasoner>,
        dispatcher: Arc<ToolDispatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            reasoner,
            dispatcher,
            tool_catalog: String::new(),
            max_iterations: 10,
        }
    }

    pub fn with_tool_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.tool_catalog = catalog.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn system_prompt(&self, ctx: &CapabilityContext, subgraph: &SubgraphState) -> String {
        let mut prompt = format!(
            "{}\n\n## User request\n{}\n\n## Plan\n{}\n\n## Current task\n[{}] {}\n\n",
            self.instructions,
            ctx.user_request(),
            ctx.plan_summary,
            ctx.task.id,
            ctx.task.description
        );
        if let Some(err) = &ctx.task.last_error {
            prompt.push_str(&format!("Previous attempt failed: {err}\n\n"));
        }
        if !self.tool_catalog.is_empty() {
            prompt.push_str("## Available tools\n");
            prompt.push_str(&self.tool_catalog);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&subgraph.history.to_prompt_section(HISTORY_IN_PROMPT));
        prompt.push_str(PROTOCOL);
        prompt
    }
}

#[async_trait]
impl Capability for ToolLoopCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &CapabilityContext,
        subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError> {
        let exec_ctx = ExecutionContext::new(&ctx.session_id).with_task(&ctx.task.id);
        loop {
            if subgraph.iterations >= self.max_iterations {
                tracing::warn!(
                    capability = %self.name,
                    task_id = %ctx.task.id,
                    iterations = subgraph.iterations,
                    "tool loop reached iteration limit"
                );
                return Ok(CapabilityOutcome::recoverable(format!(
                    "iteration limit {} reached without a final answer",
                    self.max_iterations
                )));
            }
            subgraph.iterations += 1;

            let prompt = self.system_prompt(ctx, subgraph);
            let mut context = vec![Message::user(ctx.task.description.clone())];
            context.extend(subgraph.transcript.iter().cloned());
            let reply = self.reasoner.infer(&prompt, &context).await?;
            subgraph.transcript.push(Message::assistant(reply.clone()));

            match parse_directive(&reply) {
                Directive::Final(text) => return Ok(CapabilityOutcome::Success(text)),
                Directive::AskUser(question) => return Ok(CapabilityOutcome::NeedsInput(question)),
                Directive::Fail { reason, structural } => {
                    return Ok(if structural {
                        CapabilityOutcome::structural(reason)
                    } else {
                        CapabilityOutcome::recoverable(reason)
                    })
                }
                Directive::ToolCalls(calls) => {
                    tracing::debug!(
                        capability = %self.name,
                        iteration = subgraph.iterations,
                        tools = calls.len(),
                        "tool loop dispatching"
                    );
                    let results = self.dispatcher.dispatch(&calls, &exec_ctx).await;
                    for (call, result) in calls.iter().zip(&results) {
                        let text = result.text();
                        subgraph.history.push(
                            &result.name,
                            args_preview(&call.args),
                            text.clone(),
                            result.is_ok(),
                            result.duration_ms,
                        );
                        subgraph
                            .transcript
                            .push(Message::tool(format!("[{}] {}", result.name, text)));
                    }
                }
            }
        }
    }
}

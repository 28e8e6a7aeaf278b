//! 单次工具调用执行器
//!
//! 对每次调用施加超时并捕获 panic，Err / 超时 / panic 一律转为 ToolResult.error，
//! 从不中止整个批次；每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::registry::ToolProvider;
use crate::core::recovery::duration_millis;

/// 工具调用请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "tool")]
    pub name: String,
    #[serde(default, alias = "arguments")]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// 工具调用结果：output 与 error 二选一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 供 Reasoner 阅读的文本（错误以 "Error: " 开头）
    pub fn text(&self) -> String {
        match (&self.output, &self.error) {
            (_, Some(e)) => format!("Error: {e}"),
            (Some(o), None) => o.clone(),
            (None, None) => String::new(),
        }
    }
}

pub struct ToolExecutor {
    provider: Arc<dyn ToolProvider>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(provider: Arc<dyn ToolProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let fut = self.provider.execute(&call.name, call.args.clone());
        let result = timeout(self.timeout, AssertUnwindSafe(fut).catch_unwind()).await;

        let (output, error, outcome) = match result {
            Ok(Ok(Ok(content))) => (Some(content), None, "ok"),
            Ok(Ok(Err(e))) => (None, Some(e), "error"),
            Ok(Err(_)) => (None, Some(format!("tool '{}' panicked", call.name)), "panic"),
            Err(_) => (
                None,
                Some(format!("tool '{}' timed out after {}s", call.name, self.timeout.as_secs())),
                "timeout",
            ),
        };
        let duration_ms = duration_millis(start.elapsed());
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": error.is_none(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output,
            error,
            duration_ms,
        }
    }
}

/// 参数预览，超过 200 字符截断
pub fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

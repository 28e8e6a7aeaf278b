//! Reasoner 抽象
//!
//! 语言模型调用对编排核心是不透明的：infer(system_prompt, context) 返回文本，
//! 由调用方（Planner / 能力循环 / Summary）自行解析为结构化输出或直接使用。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// Reasoner 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReasonerError {
    /// 后端不可用（网络、限流、5xx 等），可重试
    #[error("reasoner unavailable: {0}")]
    Unavailable(String),

    #[error("reasoner timed out after {0} ms")]
    Timeout(u64),
}

impl ReasonerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReasonerError::Unavailable(_) | ReasonerError::Timeout(_))
    }
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// 单次推理：system prompt + 上下文消息 -> 文本
    async fn infer(&self, system_prompt: &str, context: &[Message]) -> Result<String, ReasonerError>;
}

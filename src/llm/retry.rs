//! 带重试的 Reasoner 包装
//!
//! 对可重试错误按线性退避（attempt * base，封顶 max）重试，耗尽后把最后一次错误交给上层，
//! 由编排器生成面向用户的失败总结。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::recovery::{duration_millis, linear_backoff};
use crate::llm::{Reasoner, ReasonerError};
use crate::memory::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

pub struct RetryingReasoner {
    inner: Arc<dyn Reasoner>,
    config: RetryConfig,
}

impl RetryingReasoner {
    pub fn new(inner: Arc<dyn Reasoner>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Reasoner for RetryingReasoner {
    async fn infer(&self, system_prompt: &str, context: &[Message]) -> Result<String, ReasonerError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.infer(system_prompt, context).await {
                Ok(out) => return Ok(out),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = linear_backoff(attempt, self.config.base_delay, self.config.max_delay);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = duration_millis(delay),
                        "reasoner call failed: {e}, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, "reasoner call failed permanently: {e}");
                    return Err(e);
                }
            }
        }
    }
}

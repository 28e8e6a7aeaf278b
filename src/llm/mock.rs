//! Mock Reasoner（用于测试，无需 API）
//!
//! ScriptedReasoner 按顺序返回预设回复并记录每次调用的 system prompt；
//! FnReasoner 用闭包按 prompt 内容决定回复，便于多个组件共享同一个 Reasoner。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Reasoner, ReasonerError};
use crate::memory::Message;

/// 按脚本依次回复；脚本耗尽后返回 Unavailable
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<String, ReasonerError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条回复（可以是错误）
    pub fn push(&self, reply: Result<String, ReasonerError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// 已收到的 system prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn infer(&self, system_prompt: &str, _context: &[Message]) -> Result<String, ReasonerError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(system_prompt.to_string());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(ReasonerError::Unavailable("script exhausted".to_string())))
    }
}

/// 闭包 Reasoner
pub struct FnReasoner<F>(pub F);

#[async_trait]
impl<F> Reasoner for FnReasoner<F>
where
    F: Fn(&str, &[Message]) -> Result<String, ReasonerError> + Send + Sync,
{
    async fn infer(&self, system_prompt: &str, context: &[Message]) -> Result<String, ReasonerError> {
        (self.0)(system_prompt, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reasoner_replays_in_order() {
        let reasoner = ScriptedReasoner::new(["one", "two"]);
        assert_eq!(reasoner.infer("p1", &[]).await.unwrap(), "one");
        assert_eq!(reasoner.infer("p2", &[]).await.unwrap(), "two");
        assert!(matches!(
            reasoner.infer("p3", &[]).await,
            Err(ReasonerError::Unavailable(_))
        ));
        assert_eq!(reasoner.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_fn_reasoner_sees_context() {
        let reasoner = FnReasoner(|_: &str, ctx: &[Message]| Ok(format!("{} messages", ctx.len())));
        let out = reasoner.infer("sys", &[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "1 messages");
    }
}

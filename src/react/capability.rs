//! 能力（Capability）：任务可被路由到的具名执行单元
//!
//! 调度器把任务交给 assigned_capability 对应的能力；能力可以进行多轮推理 / 工具调用，
//! 最终返回成功文本、分类后的失败或一个需要人工回答的问题。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::checkpoint::SubgraphState;
use crate::core::{FailureKind, OrchestratorError};
use crate::memory::Message;
use crate::todo::TodoTask;

/// 能力执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityOutcome {
    Success(String),
    Failure { kind: FailureKind, reason: String },
    /// 暂停运行，向用户提问
    NeedsInput(String),
}

impl CapabilityOutcome {
    pub fn recoverable(reason: impl Into<String>) -> Self {
        CapabilityOutcome::Failure {
            kind: FailureKind::Recoverable,
            reason: reason.into(),
        }
    }

    pub fn structural(reason: impl Into<String>) -> Self {
        CapabilityOutcome::Failure {
            kind: FailureKind::Structural,
            reason: reason.into(),
        }
    }
}

/// 能力执行时可见的会话信息
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    pub session_id: String,
    pub task: TodoTask,
    /// 会话消息记录（含人工回复）
    pub messages: Vec<Message>,
    /// 当前任务表摘要
    pub plan_summary: String,
}

impl CapabilityContext {
    /// 会话的原始请求
    pub fn user_request(&self) -> &str {
        crate::memory::first_user_message(&self.messages).unwrap_or("")
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// 执行一个任务；subgraph 为该任务的工作记忆，暂停后恢复时原样传回
    async fn execute(
        &self,
        ctx: &CapabilityContext,
        subgraph: &mut SubgraphState,
    ) -> Result<CapabilityOutcome, OrchestratorError>;
}

/// 能力路由表：名称 -> 能力
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability + 'static) {
        self.register_arc(Arc::new(capability));
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(capability = %name, "capability re-registered, previous one replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// 已注册的能力名（排序后，用于拼 Planner prompt）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

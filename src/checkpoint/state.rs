//! 会话状态：持久化的最小单元
//!
//! 每一步执行后整体快照一次；阶段（Phase）决定 Orchestrator 下一步做什么。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::scheduler::{ReplanRequest, TaskOutcome};
use crate::memory::{Message, ToolHistory};
use crate::todo::TodoList;

/// 编排阶段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// 调用 Planner 生成 / 修订计划
    Plan,
    /// 调度器根据上一次结果决定路由
    Schedule,
    /// 执行任务绑定的能力
    Execute {
        task_id: String,
        capability: String,
        /// 执行前的重试退避
        #[serde(default)]
        backoff_ms: u64,
    },
    /// 汇总结果，生成最终回复
    Summary,
    /// 能力请求人工输入，等待 resume
    AwaitingInput {
        task_id: String,
        capability: String,
        question: String,
    },
    Done,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Schedule => "schedule",
            Phase::Execute { .. } => "execute",
            Phase::Summary => "summary",
            Phase::AwaitingInput { .. } => "awaiting_input",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    /// Done / Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// 能力在单个任务上的工作记忆
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubgraphState {
    pub task_id: String,
    pub history: ToolHistory,
    /// 本任务已进行的推理 / 工具轮数
    pub iterations: usize,
    /// 本任务内的推理记录（assistant 指令与工具结果）
    #[serde(default)]
    pub transcript: Vec<Message>,
}

impl SubgraphState {
    pub fn new(task_id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            task_id: task_id.into(),
            history: ToolHistory::new(history_limit),
            iterations: 0,
            transcript: Vec::new(),
        }
    }

    /// 以同一能力上一次的快照为起点开始新任务：保留工具历史，重置轮数与记录
    pub fn continue_from(previous: &SubgraphState, task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            history: previous.history.clone(),
            iterations: 0,
            transcript: Vec::new(),
        }
    }
}

/// 会话快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub todo: TodoList,
    /// 会话级消息记录（用户输入、任务结果、人工回复）
    pub messages: Vec<Message>,
    pub replan_count: u32,
    pub phase: Phase,
    /// 会话累计执行步数
    pub steps: usize,
    /// 当前这一轮用户输入以来的步数（步数预算按此计算）
    #[serde(default)]
    pub turn_steps: usize,
    /// 待调度器处理的执行结果
    #[serde(default)]
    pub pending_outcome: Option<TaskOutcome>,
    /// 待 Planner 处理的重新规划请求
    #[serde(default)]
    pub replan_request: Option<ReplanRequest>,
    /// 暂停中的能力工作记忆
    #[serde(default)]
    pub active_subgraph: Option<SubgraphState>,
    /// 各能力最近一次任务结束时的工作记忆（key 为能力名）
    #[serde(default)]
    pub subgraph_states: HashMap<String, SubgraphState>,
    /// 最终回复或等待中的问题
    #[serde(default)]
    pub final_response: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, input: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            session_id: session_id.into(),
            todo: TodoList::new(),
            messages: vec![Message::user(input)],
            replan_count: 0,
            phase: Phase::Plan,
            steps: 0,
            turn_steps: 0,
            pending_outcome: None,
            replan_request: None,
            active_subgraph: None,
            subgraph_states: HashMap::new(),
            final_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// 进入失败终态并记录面向用户的说明
    pub fn fail(&mut self, response: impl Into<String>) {
        self.phase = Phase::Failed;
        self.final_response = Some(response.into());
    }
}

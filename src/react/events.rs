//! 编排过程事件：每完成一步推送一次，供流式 / SSE 展示进度

use serde::{Deserialize, Serialize};

/// 单步结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 步骤完成，运行继续
    Ok,
    /// 运行结束并给出最终回复
    Completed,
    /// 暂停，等待人工输入
    AwaitingInput,
    Failed,
    Cancelled,
}

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    /// 会话累计步数
    pub step: usize,
    /// plan / schedule / execute / summary
    pub step_name: String,
    pub status: StepStatus,
    /// 该步产生的文本片段（任务结果、提问、最终回复等）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_text: Option<String>,
}

impl StepEvent {
    pub fn new(step: usize, step_name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step,
            step_name: step_name.into(),
            status,
            partial_text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.partial_text = Some(text.into());
        self
    }

    /// 该事件之后不会再有事件
    pub fn is_final(&self) -> bool {
        !matches!(self.status, StepStatus::Ok)
    }
}

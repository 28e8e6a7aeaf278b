//! 工具执行历史：有界环形记录
//!
//! 每个能力（capability）在执行任务期间累积工具调用记录，超出上限时丢弃最旧的；
//! 用于拼入 system prompt（Recent tool executions），避免重复调用与上下文过长。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 默认保留的记录数
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// 单条工具执行记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    /// 在当前窗口内的执行序号（从 1 开始，剪枝后重新编号）
    pub order: usize,
    pub tool: String,
    pub args_preview: String,
    pub output: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// 执行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolHistoryStats {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

/// 有界工具执行历史
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHistory {
    records: VecDeque<ToolExecutionRecord>,
    limit: usize,
}

impl Default for ToolHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ToolHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(
        &mut self,
        tool: impl Into<String>,
        args_preview: impl Into<String>,
        output: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) {
        self.records.push_back(ToolExecutionRecord {
            order: self.records.len() + 1,
            tool: tool.into(),
            args_preview: args_preview.into(),
            output: output.into(),
            success,
            duration_ms,
        });
        if self.records.len() > self.limit {
            while self.records.len() > self.limit {
                self.records.pop_front();
            }
            for (i, r) in self.records.iter_mut().enumerate() {
                r.order = i + 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ToolExecutionRecord> {
        self.records.iter()
    }

    /// 某个工具最近一次的输出
    pub fn latest_output(&self, tool: &str) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .find(|r| r.tool == tool)
            .map(|r| r.output.as_str())
    }

    pub fn has_executed(&self, tool: &str) -> bool {
        self.records.iter().any(|r| r.tool == tool)
    }

    pub fn statistics(&self) -> ToolHistoryStats {
        let success = self.records.iter().filter(|r| r.success).count();
        ToolHistoryStats {
            total: self.records.len(),
            success,
            failure: self.records.len() - success,
        }
    }

    /// 构建供 Reasoner 使用的 Prompt 片段（最近 n 条）
    pub fn to_prompt_section(&self, n: usize) -> String {
        if self.records.is_empty() {
            return String::new();
        }
        let skip = self.records.len().saturating_sub(n);
        let mut s = String::from("## Recent tool executions\n");
        for r in self.records.iter().skip(skip) {
            let mark = if r.success { "ok" } else { "error" };
            s.push_str(&format!(
                "{}. {}({}) [{}] -> {}\n",
                r.order, r.tool, r.args_preview, mark, r.output
            ));
        }
        s.push('\n');
        s
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

//! 工具间依赖判定：决定一个批次能否并行
//!
//! 默认认为所有工具相互独立；需要更保守的策略时替换为自定义谓词。

use super::executor::ToolCall;

pub trait DependencyPredicate: Send + Sync {
    /// later 是否依赖 earlier 的结果
    fn depends_on(&self, earlier: &ToolCall, later: &ToolCall) -> bool;

    /// 批次内是否存在任意一对依赖
    fn has_dependencies(&self, calls: &[ToolCall]) -> bool {
        calls.iter().enumerate().any(|(i, earlier)| {
            calls[i + 1..]
                .iter()
                .any(|later| self.depends_on(earlier, later))
        })
    }
}

/// 总是独立
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysIndependent;

impl DependencyPredicate for AlwaysIndependent {
    fn depends_on(&self, _earlier: &ToolCall, _later: &ToolCall) -> bool {
        false
    }
}

impl<F> DependencyPredicate for F
where
    F: Fn(&ToolCall, &ToolCall) -> bool + Send + Sync,
{
    fn depends_on(&self, earlier: &ToolCall, later: &ToolCall) -> bool {
        self(earlier, later)
    }
}

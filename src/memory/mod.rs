//! 记忆层：会话上下文日志与工具执行历史

pub mod conversation;
pub mod tool_history;

pub use conversation::{first_user_message, last_user_message, recent, Message, Role};
pub use tool_history::{ToolExecutionRecord, ToolHistory, ToolHistoryStats};

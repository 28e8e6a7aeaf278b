//! Reasoner 层：不透明的模型推理能力、输出解析、重试包装与 Mock

pub mod mock;
pub mod parse;
pub mod retry;
pub mod traits;

pub use mock::{FnReasoner, ScriptedReasoner};
pub use parse::extract_json_block;
pub use retry::{RetryConfig, RetryingReasoner};
pub use traits::{Reasoner, ReasonerError};

//! 工具层：工具提供方抽象、注册表、单次执行器、批次分发器

pub mod dependency;
pub mod dispatcher;
pub mod executor;
pub mod registry;

pub use dependency::{AlwaysIndependent, DependencyPredicate};
pub use dispatcher::{ExecutionContext, ToolDispatcher};
pub use executor::{args_preview, ToolCall, ToolExecutor, ToolResult};
pub use registry::{Tool, ToolProvider, ToolRegistry};

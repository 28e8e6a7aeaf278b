//! Hive - 多步智能体任务编排引擎
//!
//! 模块划分：
//! - **checkpoint**: 会话状态快照与检查点存储（内存 / SQLite）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、调度状态机、会话监管、编排主循环
//! - **llm**: 不透明的 Reasoner 抽象、输出解析、重试包装与 Mock
//! - **memory**: 会话消息与工具执行历史
//! - **observability**: tracing 初始化
//! - **react**: Planner、能力与工具循环、Summary、过程事件
//! - **todo**: 任务列表、任务状态与 Plan Diff
//! - **tools**: 工具提供方、执行器与并行分发器

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod todo;
pub mod tools;

pub use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, SessionState};
pub use crate::config::{load_config, AppConfig};
pub use crate::core::{Orchestrator, OrchestratorBuilder, OrchestratorError, RunOutcome, RunStatus};
pub use crate::react::{Capability, CapabilityContext, CapabilityOutcome, StepEvent, StepStatus};

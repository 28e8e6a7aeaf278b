//! 核心编排层：错误与恢复、调度状态机、会话监管、编排主循环与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod session_supervisor;

pub use builder::OrchestratorBuilder;
pub use error::{FailureAction, FailureKind, OrchestratorError, RecoveryAction};
pub use orchestrator::{Orchestrator, RunOutcome, RunStatus};
pub use recovery::{duration_millis, linear_backoff, RecoveryEngine};
pub use scheduler::{Decision, Dispatch, ReplanRequest, Scheduler, TaskOutcome};
pub use session_supervisor::{SessionRegistry, SessionSupervisor};

//! 认知层：Planner、能力（含工具循环）、Summary 与过程事件

pub mod capability;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod summary;

pub use capability::{Capability, CapabilityContext, CapabilityOutcome, CapabilityRegistry};
pub use events::{StepEvent, StepStatus};
pub use loop_::{parse_directive, Directive, ToolLoopCapability};
pub use planner::Planner;
pub use summary::{failure_summary, Summarizer};

//! 任务模型：TodoTask / TodoList 与 Planner 增量计划（PlanDiff）

pub mod diff;
pub mod list;
pub mod task;

pub use diff::{apply, parse_plan_diff, DiffError, PlanDiff, StatusUpdate, TaskSpec};
pub use list::{TodoError, TodoList};
pub use task::{TaskStatus, TodoTask, UnknownStatus};

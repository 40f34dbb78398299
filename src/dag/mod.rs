// src/dag/mod.rs

//! Task registry, dependency resolution and scheduling.
//!
//! - [`graph`] holds the registry of named tasks and their direct deps.
//! - [`plan`] resolves requested names into a topologically ordered plan.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and what happens when one fails.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod plan;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{Graph, TaskDef};
pub use plan::ExecutionPlan;
pub use scheduler::Scheduler;
pub use scheduler_step::{RunFailure, SchedulerStep};
pub use task_info::{ScheduledTask, TaskRunState};

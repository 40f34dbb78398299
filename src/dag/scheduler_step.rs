// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// A task failure that aborted the run.
#[derive(Debug)]
pub struct RunFailure {
    pub task: TaskName,
    pub cause: anyhow::Error,
}

/// Structured result of a single scheduler "step".
#[derive(Debug, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that will never start because this step aborted the run.
    pub newly_skipped: Vec<TaskName>,
    /// Set when this step recorded a failure that aborts the run.
    pub failure: Option<RunFailure>,
    /// Whether every planned task is now terminal.
    pub run_just_finished: bool,
}

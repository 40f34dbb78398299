// src/engine/mod.rs

//! Orchestration engine for pipeworks.
//!
//! The pure per-run state machine lives in [`crate::dag::scheduler`]; this
//! module holds the async shell around it ([`runner`]) together with the
//! small vocabulary types shared by the scheduler, the executor and the
//! watch layer.

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task action as reported to the scheduler.
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    Failed(anyhow::Error),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

impl From<anyhow::Result<()>> for TaskOutcome {
    fn from(res: anyhow::Result<()>) -> Self {
        match res {
            Ok(()) => TaskOutcome::Success,
            Err(err) => TaskOutcome::Failed(err),
        }
    }
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested on the command line or through the library API.
    Manual,
    /// Started by a watch rule after a filesystem change.
    FileWatch,
}

/// Event sent by a finished action back to the runner loop.
#[derive(Debug)]
pub struct TaskFinished {
    pub task: TaskName,
    pub run_id: u64,
    pub outcome: TaskOutcome,
}

pub mod runner;

pub use runner::{RunReport, Runner, RunnerOptions};

// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::fmt;
use std::sync::Arc;

use crate::dag::graph::TaskDef;
use crate::engine::TaskName;
use crate::exec::action::TaskAction;

/// Per-run state of a planned task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on dependencies.
    Pending,
    /// Dispatched to the executor.
    Running,
    /// Action completed successfully.
    DoneSuccess,
    /// Action failed but the task is marked continue-on-error; dependents
    /// still treat it as satisfied.
    DoneTolerated,
    /// Action failed and aborted the run.
    DoneFailed,
    /// Never started because the run was aborted.
    Skipped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Pending | RunState::Running)
    }

    /// Whether dependents of a task in this state may start.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, RunState::DoneSuccess | RunState::DoneTolerated)
    }
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not part of this run's plan.
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneTolerated,
    DoneFailed,
    Skipped,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::DoneSuccess) => TaskRunState::DoneSuccess,
            Some(RunState::DoneTolerated) => TaskRunState::DoneTolerated,
            Some(RunState::DoneFailed) => TaskRunState::DoneFailed,
            Some(RunState::Skipped) => TaskRunState::Skipped,
        }
    }
}

/// Static task information for one run, plus its per-run state.
#[derive(Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    /// Index in the execution plan.
    pub position: usize,
    pub deps: Vec<TaskName>,
    pub continue_on_error: bool,
    pub action: Arc<dyn TaskAction>,
    pub run_state: RunState,
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("deps", &self.deps)
            .field("run_state", &self.run_state)
            .finish_non_exhaustive()
    }
}

impl TaskInfo {
    pub fn from_def(def: &TaskDef, position: usize) -> Self {
        Self {
            name: def.name().to_string(),
            position,
            deps: def.deps().to_vec(),
            continue_on_error: def.is_continue_on_error(),
            action: def.action(),
            run_state: RunState::Pending,
        }
    }
}

/// A task the scheduler wants the executor to start now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub action: Arc<dyn TaskAction>,
    /// Identifier shared by all tasks of the same run.
    pub run_id: u64,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, run_id: u64) -> Self {
        Self {
            name: info.name.clone(),
            action: Arc::clone(&info.action),
            run_id,
        }
    }
}

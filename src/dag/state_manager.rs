// src/dag/state_manager.rs

//! Per-run state transitions for planned tasks.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::plan::ExecutionPlan;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    plan: &'a ExecutionPlan,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(
        plan: &'a ExecutionPlan,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        run_id: u64,
    ) -> Self {
        Self {
            plan,
            tasks,
            run_id,
        }
    }

    /// Collect `Pending` tasks whose dependencies are satisfied, in plan
    /// order and up to `capacity` of them, mark them `Running` and return
    /// them for dispatch.
    pub fn collect_new_ready_tasks(&mut self, capacity: usize) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskName> = {
            let ro = ReadOnlyStateManager::new(self.tasks);
            self.plan
                .tasks()
                .iter()
                .filter(|name| {
                    self.tasks
                        .get(name.as_str())
                        .is_some_and(|info| {
                            info.run_state == RunState::Pending && ro.deps_satisfied_for_info(info)
                        })
                })
                .take(capacity)
                .cloned()
                .collect()
        };

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                debug!(
                    task = %info.name,
                    run_id = self.run_id,
                    position = info.position,
                    "dependencies satisfied; marking Running"
                );
                info.run_state = RunState::Running;
                ready.push(ScheduledTask::from_task_info(info, self.run_id));
            }
        }

        ready
    }

    /// Mark every task that has not started yet as `Skipped`.
    ///
    /// Returns the names of the newly skipped tasks in plan order.
    pub fn skip_pending(&mut self) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for name in self.plan.tasks() {
            if let Some(info) = self.tasks.get_mut(name) {
                if info.run_state == RunState::Pending {
                    info.run_state = RunState::Skipped;
                    skipped.push(name.clone());
                }
            }
        }
        if !skipped.is_empty() {
            debug!(run_id = self.run_id, ?skipped, "run aborted; skipping tasks that never started");
        }
        skipped
    }

    /// Number of tasks currently dispatched.
    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.run_state == RunState::Running)
            .count()
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|info| info.run_state.is_terminal())
    }
}

/// A read-only view used when only shared access to the tasks map exists.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Whether all dependencies of the given task allow it to start.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => dep.run_state.satisfies_dependents(),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from plan"
                );
                false
            }
        })
    }
}

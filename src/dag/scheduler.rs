use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::plan::ExecutionPlan;
use crate::dag::scheduler_step::{RunFailure, SchedulerStep};
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Scheduler holds one run's execution plan plus its mutable per-run state.
///
/// It is responsible for:
/// - deciding when a planned task is "ready" to run (deps satisfied)
/// - capping how many tasks are dispatched at once
/// - recording success, tolerated failure and fatal failure
/// - skipping everything not yet started once the run aborts
///
/// It performs no IO; the runner feeds it completions and dispatches
/// whatever it returns.
#[derive(Debug)]
pub struct Scheduler {
    plan: ExecutionPlan,
    tasks: HashMap<TaskName, TaskInfo>,
    run_id: u64,
    /// `None` means unlimited.
    max_parallel: Option<usize>,
    aborted: bool,
    finished: bool,
}

impl Scheduler {
    /// Build per-run state for every task in `plan`.
    ///
    /// `graph` must be the graph the plan was resolved against.
    pub fn new(plan: ExecutionPlan, graph: &Graph, run_id: u64, max_parallel: Option<usize>) -> Self {
        let mut tasks = HashMap::with_capacity(plan.len());
        for (position, name) in plan.tasks().iter().enumerate() {
            if let Some(def) = graph.get(name) {
                tasks.insert(name.clone(), TaskInfo::from_def(def, position));
            } else {
                warn!(task = %name, "planned task missing from graph; ignoring");
            }
        }

        Self {
            plan,
            tasks,
            run_id,
            max_parallel: max_parallel.filter(|n| *n > 0),
            aborted: false,
            finished: false,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Whether every planned task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether a fatal failure has aborted this run.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Read-only view of the given task's state in this run.
    pub fn run_state_of(&self, task: &str) -> TaskRunState {
        self.tasks.get(task).map(|info| info.run_state).into()
    }

    /// Whether the dependencies of `task` are satisfied in this run.
    ///
    /// Returns `None` if the task is not part of the plan.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Number of tasks currently dispatched and not yet completed.
    pub fn running(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.run_state == RunState::Running)
            .count()
    }

    /// Schedule the tasks that have no unmet dependencies.
    ///
    /// An empty plan finishes immediately.
    pub fn start(&mut self) -> SchedulerStep {
        debug!(run_id = self.run_id, tasks = self.plan.len(), "scheduler: starting run");
        let newly_scheduled = self.collect_ready();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    /// Record the completion of a dispatched task.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, run_id = self.run_id, "completion for task outside this run; ignoring");
            return step;
        };

        if info.run_state != RunState::Running {
            warn!(
                task = %task,
                run_id = self.run_id,
                state = ?info.run_state,
                "completion for task that is not running; ignoring"
            );
            return step;
        }

        match outcome {
            TaskOutcome::Success => {
                info.run_state = RunState::DoneSuccess;
                debug!(task = %info.name, run_id = self.run_id, "task completed successfully");
            }
            TaskOutcome::Failed(cause) if info.continue_on_error => {
                info.run_state = RunState::DoneTolerated;
                warn!(
                    task = %info.name,
                    run_id = self.run_id,
                    error = %format!("{cause:#}"),
                    "task failed; continuing because it is marked continue_on_error"
                );
            }
            TaskOutcome::Failed(cause) => {
                info.run_state = RunState::DoneFailed;
                warn!(
                    task = %info.name,
                    run_id = self.run_id,
                    "task failed; aborting run"
                );
                self.aborted = true;
                step.failure = Some(RunFailure {
                    task: task.to_string(),
                    cause,
                });
                let mut manager = StateManager::new(&self.plan, &mut self.tasks, self.run_id);
                step.newly_skipped = manager.skip_pending();
            }
        }

        if !self.aborted {
            step.newly_scheduled = self.collect_ready();
        }
        step.run_just_finished = self.maybe_finish_run();
        step
    }

    fn collect_ready(&mut self) -> Vec<crate::dag::task_info::ScheduledTask> {
        let mut manager = StateManager::new(&self.plan, &mut self.tasks, self.run_id);
        let capacity = match self.max_parallel {
            Some(limit) => limit.saturating_sub(manager.running_count()),
            None => usize::MAX,
        };
        if capacity == 0 {
            return Vec::new();
        }
        manager.collect_new_ready_tasks(capacity)
    }

    /// Returns `true` if this call transitioned the run to finished.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&self.plan, &mut self.tasks, self.run_id);
        if manager.all_tasks_terminal() {
            info!(
                run_id = self.run_id,
                aborted = self.aborted,
                "scheduler: all tasks terminal; run finished"
            );
            self.finished = true;
            true
        } else {
            false
        }
    }
}

// src/engine/runner.rs

//! Async shell around the [`Scheduler`]: resolves a request into a plan,
//! dispatches ready actions and feeds their completions back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{ExecutionPlan, Graph, Scheduler, SchedulerStep};
use crate::engine::{TaskFinished, TaskName, TriggerReason};
use crate::errors::{PipeworksError, Result};
use crate::exec::action::TaskContext;
use crate::exec::executor::spawn_action;
use crate::proxy::ReloadHub;

/// Tunables for task dispatch.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Upper bound on concurrently running actions; `None` is unlimited.
    pub max_parallel: Option<usize>,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: u64,
    /// Tasks whose action finished, in completion order.
    pub executed: Vec<TaskName>,
    /// Tasks that failed but were marked continue-on-error.
    pub tolerated_failures: Vec<TaskName>,
    pub elapsed: Duration,
}

/// Runs requested tasks against a shared, read-only [`Graph`].
///
/// Cheap to clone; every clone shares the graph, the reload hub and the
/// run counter.
#[derive(Clone)]
pub struct Runner {
    graph: Arc<Graph>,
    options: RunnerOptions,
    root: Arc<PathBuf>,
    reload: ReloadHub,
    run_counter: Arc<AtomicU64>,
}

impl Runner {
    pub fn new(graph: impl Into<Arc<Graph>>) -> Self {
        Self {
            graph: graph.into(),
            options: RunnerOptions::default(),
            root: Arc::new(PathBuf::from(".")),
            reload: ReloadHub::new(),
            run_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory actions run in and resolve relative paths against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Arc::new(root.into());
        self
    }

    pub fn with_reload_hub(mut self, reload: ReloadHub) -> Self {
        self.reload = reload;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reload_hub(&self) -> &ReloadHub {
        &self.reload
    }

    /// Resolve `names` without running anything.
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<ExecutionPlan> {
        ExecutionPlan::resolve(&self.graph, names)
    }

    /// Run `names` and their transitive dependencies once each.
    pub async fn run<S: AsRef<str>>(&self, names: &[S]) -> Result<RunReport> {
        self.run_with_reason(names, TriggerReason::Manual).await
    }

    /// Like [`Runner::run`], tagging the run with why it was started.
    ///
    /// Resolution errors are returned before any action starts. The first
    /// fatal task failure is returned as soon as it is reported; actions
    /// already in flight keep running in the background.
    pub async fn run_with_reason<S: AsRef<str>>(
        &self,
        names: &[S],
        reason: TriggerReason,
    ) -> Result<RunReport> {
        let plan = self.plan(names)?;
        let run_id = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        info!(
            run_id,
            ?reason,
            tasks = ?plan.tasks(),
            "starting run"
        );

        let mut scheduler = Scheduler::new(plan, &self.graph, run_id, self.options.max_parallel);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TaskFinished>();

        let mut executed = Vec::new();
        let mut tolerated_failures = Vec::new();

        let step = scheduler.start();
        self.dispatch(&step, &done_tx);
        let mut finished = step.run_just_finished;

        while !finished {
            if scheduler.running() == 0 {
                // Nothing in flight and nothing ready: the plan cannot make
                // progress.
                return Err(PipeworksError::Other(anyhow!(
                    "run {run_id} stalled with no runnable tasks"
                )));
            }

            let Some(done) = done_rx.recv().await else {
                return Err(PipeworksError::Other(anyhow!(
                    "run {run_id}: completion channel closed unexpectedly"
                )));
            };
            debug!(task = %done.task, run_id = done.run_id, success = done.outcome.is_success(), "task completion received");

            let failed = !done.outcome.is_success();
            let mut step = scheduler.step_completion(&done.task, done.outcome);
            executed.push(done.task.clone());

            if let Some(failure) = step.failure.take() {
                warn!(
                    run_id,
                    task = %failure.task,
                    skipped = ?step.newly_skipped,
                    "run aborted"
                );
                return Err(PipeworksError::task_failed(failure.task, failure.cause));
            }
            if failed {
                tolerated_failures.push(done.task);
            }

            self.dispatch(&step, &done_tx);
            finished = step.run_just_finished;
        }

        let report = RunReport {
            run_id,
            executed,
            tolerated_failures,
            elapsed: started.elapsed(),
        };
        info!(
            run_id,
            tasks = report.executed.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    fn dispatch(&self, step: &SchedulerStep, done_tx: &mpsc::UnboundedSender<TaskFinished>) {
        for task in &step.newly_scheduled {
            let ctx = TaskContext {
                task: task.name.clone(),
                run_id: task.run_id,
                root: Arc::clone(&self.root),
                reload: self.reload.clone(),
            };
            spawn_action(task.clone(), ctx, done_tx.clone());
        }
    }
}

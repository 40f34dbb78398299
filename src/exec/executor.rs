// src/exec/executor.rs

//! Dispatches scheduled task actions onto the tokio runtime.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{TaskFinished, TaskOutcome};
use crate::exec::action::TaskContext;

/// Run one scheduled action in its own tokio task and report its outcome
/// on `done_tx`.
///
/// A panicking action is reported as a failure rather than tearing down
/// the run loop.
pub fn spawn_action(
    task: ScheduledTask,
    ctx: TaskContext,
    done_tx: mpsc::UnboundedSender<TaskFinished>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(task = %task.name, run_id = task.run_id, "starting task");
        let started = Instant::now();

        let action = Arc::clone(&task.action);
        let result = AssertUnwindSafe(async move { action.start(ctx).await })
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(res) => TaskOutcome::from(res),
            Err(panic) => TaskOutcome::Failed(anyhow!(
                "task panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            TaskOutcome::Success => {
                info!(task = %task.name, run_id = task.run_id, elapsed_ms, "task finished");
            }
            TaskOutcome::Failed(err) => {
                warn!(
                    task = %task.name,
                    run_id = task.run_id,
                    elapsed_ms,
                    error = %format!("{err:#}"),
                    "task failed"
                );
            }
        }

        let finished = TaskFinished {
            task: task.name,
            run_id: task.run_id,
            outcome,
        };
        if done_tx.send(finished).is_err() {
            debug!("run loop already gone; dropping task completion");
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

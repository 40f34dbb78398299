//! Actions that record what ran, in which order and how many at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeworks::exec::{ActionFuture, TaskAction, TaskContext};

#[derive(Debug, Default)]
struct Shared {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// Shared log for a set of [`RecordingAction`]s.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Action that records `label` and succeeds immediately.
    pub fn action(&self, label: &str) -> RecordingAction {
        RecordingAction {
            label: label.to_string(),
            delay: Duration::ZERO,
            fail_with: None,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Labels in start order.
    pub fn started(&self) -> Vec<String> {
        self.shared.started.lock().unwrap().clone()
    }

    /// Labels in completion order.
    pub fn finished(&self) -> Vec<String> {
        self.shared.finished.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.started().iter().filter(|l| *l == label).count()
    }

    /// Highest number of recorded actions that were in flight at once.
    pub fn max_running(&self) -> usize {
        self.shared.max_running.load(Ordering::SeqCst)
    }
}

/// An action built by [`Recorder::action`].
#[derive(Debug, Clone)]
pub struct RecordingAction {
    label: String,
    delay: Duration,
    fail_with: Option<String>,
    shared: Arc<Shared>,
}

impl RecordingAction {
    /// Sleep for `delay` before completing.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Complete with an error carrying `msg`.
    pub fn failing(mut self, msg: &str) -> Self {
        self.fail_with = Some(msg.to_string());
        self
    }
}

impl TaskAction for RecordingAction {
    fn start(&self, _ctx: TaskContext) -> ActionFuture {
        let this = self.clone();
        Box::pin(async move {
            let shared = &this.shared;
            shared.started.lock().unwrap().push(this.label.clone());
            let now = shared.running.fetch_add(1, Ordering::SeqCst) + 1;
            shared.max_running.fetch_max(now, Ordering::SeqCst);

            if !this.delay.is_zero() {
                tokio::time::sleep(this.delay).await;
            }

            shared.running.fetch_sub(1, Ordering::SeqCst);
            shared.finished.lock().unwrap().push(this.label.clone());

            match this.fail_with {
                Some(msg) => Err(anyhow::anyhow!(msg)),
                None => Ok(()),
            }
        })
    }

    fn describe(&self) -> Option<String> {
        Some(format!("record: {}", self.label))
    }
}

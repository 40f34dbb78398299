// src/watch/dispatcher.rs

//! Turns batches of changed paths into watch-triggered runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::{Runner, TaskName, TriggerReason};
use crate::types::WatchOverlap;
use crate::watch::gate::{GateDecision, RerunGate};
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::CompiledRule;

/// Paths reported together by the filesystem watcher.
pub type ChangeBatch = Vec<PathBuf>;

struct RuleSlot {
    rule: CompiledRule,
    gate: Arc<RerunGate>,
}

/// Maps change batches onto rule reruns.
///
/// Each matching rule triggers its task list once per batch, however many
/// of the batch's paths it matched. In [`WatchOverlap::Serialize`] mode a
/// rule never has two runs in flight; triggers that arrive meanwhile
/// collapse into a single rerun.
#[derive(Clone)]
pub struct WatchDispatcher {
    root: Arc<PathBuf>,
    rules: Arc<Vec<RuleSlot>>,
    runner: Runner,
    overlap: WatchOverlap,
}

impl WatchDispatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        rules: Vec<CompiledRule>,
        runner: Runner,
        overlap: WatchOverlap,
    ) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RuleSlot {
                rule,
                gate: Arc::new(RerunGate::new()),
            })
            .collect();
        Self {
            root: Arc::new(root.into()),
            rules: Arc::new(rules),
            runner,
            overlap,
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().map(|slot| &slot.rule)
    }

    /// Indices of the rules any path of `batch` matches.
    ///
    /// Absolute paths are made relative to the project root; relative
    /// paths are taken as already relative to it.
    pub fn matching_rules(&self, batch: &[PathBuf]) -> Vec<usize> {
        let rel_paths: Vec<String> = batch
            .iter()
            .filter_map(|path| self.relative(path))
            .collect();

        self.rules
            .iter()
            .enumerate()
            .filter(|(_, slot)| rel_paths.iter().any(|p| slot.rule.matches(p)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Trigger every rule matched by `batch`.
    ///
    /// Returns the handles of the runs started by this batch; queued or
    /// coalesced triggers start nothing new.
    pub fn handle_batch(&self, batch: &[PathBuf]) -> Vec<JoinHandle<()>> {
        let matched = self.matching_rules(batch);
        if matched.is_empty() {
            debug!(paths = batch.len(), "change batch matched no watch rule");
            return Vec::new();
        }

        let mut handles = Vec::new();
        for idx in matched {
            let slot = &self.rules[idx];
            let tasks = slot.rule.tasks().to_vec();
            let rule_id = slot.rule.id();

            match self.overlap {
                WatchOverlap::Concurrent => {
                    let runner = self.runner.clone();
                    handles.push(tokio::spawn(async move {
                        run_rule(&runner, rule_id, &tasks).await;
                    }));
                }
                WatchOverlap::Serialize => match slot.gate.request() {
                    GateDecision::Start => {
                        let runner = self.runner.clone();
                        let gate = Arc::clone(&slot.gate);
                        handles.push(tokio::spawn(async move {
                            loop {
                                run_rule(&runner, rule_id, &tasks).await;
                                if !gate.finish() {
                                    break;
                                }
                                debug!(rule = rule_id, "running queued rerun");
                            }
                        }));
                    }
                    GateDecision::Queued => {
                        debug!(rule = rule_id, "rule already running; rerun queued");
                    }
                    GateDecision::Coalesced => {
                        debug!(rule = rule_id, "rule already running with a rerun queued; coalesced");
                    }
                },
            }
        }
        handles
    }

    /// Consume change batches until the channel closes.
    pub async fn run(self, mut batches: mpsc::UnboundedReceiver<ChangeBatch>) {
        info!(rules = self.rules.len(), "watch dispatcher started");
        while let Some(batch) = batches.recv().await {
            self.handle_batch(&batch);
        }
        debug!("watch dispatcher finished (channel closed)");
    }

    fn relative(&self, path: &Path) -> Option<String> {
        if path.is_relative() {
            return Some(path.to_string_lossy().replace('\\', "/"));
        }
        relative_str(&self.root, path)
    }
}

async fn run_rule(runner: &Runner, rule_id: usize, tasks: &[TaskName]) {
    info!(rule = rule_id, ?tasks, "change detected; running watch tasks");
    match runner.run_with_reason(tasks, TriggerReason::FileWatch).await {
        Ok(report) => {
            debug!(rule = rule_id, run_id = report.run_id, "watch-triggered run finished");
        }
        Err(e) => {
            // The watcher keeps going; the next change retries.
            error!(rule = rule_id, error = %e, "watch-triggered run failed");
        }
    }
}

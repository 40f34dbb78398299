// src/pipeline.rs

//! Builds the runnable pieces out of a validated [`ConfigFile`]: the task
//! [`Graph`], the watch rules each task declares and which tasks leave a
//! service running.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::model::{ActionKind, ConfigFile, ProxySection, TaskConfig};
use crate::dag::{ExecutionPlan, Graph, TaskDef};
use crate::engine::TaskName;
use crate::errors::{PipeworksError, Result};
use crate::exec::{CleanAction, ServiceOptions, ShellAction, ShellSpec};
use crate::proxy::{ProxyAction, ProxySettings, Route};
use crate::types::parse_duration;
use crate::watch::WatchRule;

#[derive(Debug, Clone)]
pub struct Pipeline {
    graph: Arc<Graph>,
    watch: BTreeMap<TaskName, Vec<WatchRule>>,
    services: BTreeSet<TaskName>,
}

impl Pipeline {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut graph = Graph::new();
        let mut watch = BTreeMap::new();
        let mut services = BTreeSet::new();

        // All proxy tasks share one server.
        let proxy = cfg.proxy().map(|section| ProxyAction::new(proxy_settings(section)));

        for (name, task) in cfg.tasks() {
            let kind = task
                .action_kind()
                .map_err(|e| PipeworksError::ConfigError(format!("task '{name}' {e}")))?;

            let def = match kind {
                ActionKind::Composite => TaskDef::composite(name.as_str(), &task.after),
                ActionKind::Command => TaskDef::new(
                    name.as_str(),
                    &task.after,
                    ShellAction::new(shell_spec(cfg, name, task)?),
                ),
                ActionKind::Clean => TaskDef::new(
                    name.as_str(),
                    &task.after,
                    CleanAction::new(task.clean.clone().unwrap_or_default()),
                ),
                ActionKind::Proxy => {
                    let action = proxy.clone().ok_or_else(|| {
                        PipeworksError::ConfigError(format!(
                            "task '{name}' sets `proxy = true` but there is no [proxy] section"
                        ))
                    })?;
                    TaskDef::new(name.as_str(), &task.after, action)
                }
            };
            graph.insert(def.continue_on_error(task.continue_on_error));

            if task.is_service() {
                services.insert(name.clone());
            }
            if !task.watch.is_empty() {
                let rules = task
                    .watch
                    .iter()
                    .map(|w| WatchRule::new(&w.patterns, &w.tasks).exclude(&w.exclude))
                    .collect();
                watch.insert(name.clone(), rules);
            }
            debug!(task = %name, ?kind, "pipeline task built");
        }

        Ok(Self {
            graph: Arc::new(graph),
            watch,
            services,
        })
    }

    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    /// Watch rules declared by tasks in `plan`, in plan order.
    pub fn watch_rules_for(&self, plan: &ExecutionPlan) -> Vec<WatchRule> {
        plan.tasks()
            .iter()
            .filter_map(|name| self.watch.get(name))
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether running `plan` leaves a long-lived process or the proxy up.
    pub fn starts_service(&self, plan: &ExecutionPlan) -> bool {
        plan.tasks().iter().any(|name| self.services.contains(name))
    }

    pub fn is_service(&self, task: &str) -> bool {
        self.services.contains(task)
    }
}

fn shell_spec(cfg: &ConfigFile, name: &str, task: &TaskConfig) -> Result<ShellSpec> {
    let cmd = task.cmd.clone().unwrap_or_default();
    let mut spec = ShellSpec::new(cmd);

    if let Some(profile) = &task.bundle {
        let settings = cfg.bundler().profile(profile).ok_or_else(|| {
            PipeworksError::ConfigError(format!(
                "task '{name}' uses unknown bundler profile '{profile}'"
            ))
        })?;
        spec.env = settings.to_env();
    }
    spec.env
        .extend(task.env.iter().map(|(k, v)| (k.clone(), v.clone())));

    if task.long_lived {
        let ready_on_stdout = task
            .ready_on_stdout
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                PipeworksError::ConfigError(format!("task '{name}' `ready_on_stdout`: {e}"))
            })?;
        let ready_after = task
            .ready_after
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| PipeworksError::ConfigError(format!("task '{name}' `ready_after`: {e}")))?;
        spec.service = Some(ServiceOptions {
            ready_on_stdout,
            ready_after,
            restart: task.restart,
        });
    }
    spec.reload = task.reload;
    Ok(spec)
}

fn proxy_settings(section: &ProxySection) -> ProxySettings {
    ProxySettings {
        host: section.host.clone(),
        port: section.port,
        base_dir: section.base_dir.clone(),
        routes: section
            .routes
            .iter()
            .map(|r| Route::new(&r.prefix, &r.upstream))
            .collect(),
    }
}

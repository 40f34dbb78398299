// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ActionKind, ConfigFile, DEFAULT_DEBOUNCE, RawConfigFile, TaskConfig};
use crate::dag::plan::cycle_through;
use crate::errors::{PipeworksError, Result};
use crate::types::parse_duration;
use crate::watch::patterns::build_globset;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipeworksError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let debounce = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, debounce))
    }
}

/// Run every check; returns the parsed debounce window.
fn validate_raw_config(cfg: &RawConfigFile) -> Result<std::time::Duration> {
    ensure_has_tasks(cfg)?;
    let debounce = validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_actions(cfg)?;
    validate_proxy(cfg)?;
    validate_watch_rules(cfg)?;
    validate_dag(cfg)?;
    Ok(debounce)
}

fn config_error(msg: impl Into<String>) -> PipeworksError {
    PipeworksError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<std::time::Duration> {
    match cfg.config.debounce.as_deref() {
        None => Ok(DEFAULT_DEBOUNCE),
        Some(raw) => parse_duration(raw)
            .map_err(|e| config_error(format!("[config].debounce: {e}"))),
    }
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(config_error(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(PipeworksError::UnknownTask {
                    task: dep.clone(),
                    required_by: Some(name.clone()),
                });
            }
        }
    }
    Ok(())
}

fn validate_actions(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        let kind = task
            .action_kind()
            .map_err(|e| config_error(format!("task '{name}' {e}")))?;
        validate_command_options(cfg, name, task, kind)?;

        if kind == ActionKind::Proxy && cfg.proxy.is_none() {
            return Err(config_error(format!(
                "task '{name}' sets `proxy = true` but there is no [proxy] section"
            )));
        }
        if let Some(targets) = &task.clean {
            if targets.is_empty() {
                return Err(config_error(format!(
                    "task '{name}' has an empty `clean` list"
                )));
            }
        }
    }
    Ok(())
}

/// Options that only make sense on a `cmd` task, and `long_lived` options
/// that only make sense on a long-lived one.
fn validate_command_options(
    cfg: &RawConfigFile,
    name: &str,
    task: &TaskConfig,
    kind: ActionKind,
) -> Result<()> {
    let is_cmd = kind == ActionKind::Command;

    let cmd_only = [
        ("env", !task.env.is_empty()),
        ("bundle", task.bundle.is_some()),
        ("long_lived", task.long_lived),
        ("reload", task.reload.is_some()),
    ];
    for (field, set) in cmd_only {
        if set && !is_cmd {
            return Err(config_error(format!(
                "task '{name}' sets `{field}` but has no `cmd`"
            )));
        }
    }

    let service_only = [
        ("ready_on_stdout", task.ready_on_stdout.is_some()),
        ("ready_after", task.ready_after.is_some()),
        ("restart", task.restart),
    ];
    for (field, set) in service_only {
        if set && !task.long_lived {
            return Err(config_error(format!(
                "task '{name}' sets `{field}` but is not `long_lived`"
            )));
        }
    }

    if let Some(profile) = &task.bundle {
        if !cfg.bundler.profiles.contains_key(profile) {
            return Err(config_error(format!(
                "task '{name}' uses unknown bundler profile '{profile}'"
            )));
        }
    }
    if let Some(pattern) = &task.ready_on_stdout {
        Regex::new(pattern).map_err(|e| {
            config_error(format!("task '{name}' has invalid `ready_on_stdout`: {e}"))
        })?;
    }
    if let Some(raw) = &task.ready_after {
        parse_duration(raw)
            .map_err(|e| config_error(format!("task '{name}' `ready_after`: {e}")))?;
    }
    Ok(())
}

fn validate_proxy(cfg: &RawConfigFile) -> Result<()> {
    let Some(proxy) = &cfg.proxy else {
        return Ok(());
    };

    for route in &proxy.routes {
        if !route.prefix.starts_with('/') {
            return Err(config_error(format!(
                "[[proxy.route]] prefix '{}' must start with '/'",
                route.prefix
            )));
        }
        let url = reqwest::Url::parse(&route.upstream).map_err(|e| {
            config_error(format!(
                "[[proxy.route]] '{}' has invalid upstream '{}': {e}",
                route.prefix, route.upstream
            ))
        })?;
        if url.scheme() != "http" {
            return Err(config_error(format!(
                "[[proxy.route]] '{}' upstream must be an http:// URL (got '{}')",
                route.prefix, route.upstream
            )));
        }
    }
    Ok(())
}

fn validate_watch_rules(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for (idx, rule) in task.watch.iter().enumerate() {
            if rule.patterns.is_empty() {
                return Err(config_error(format!(
                    "task '{name}' watch rule #{idx} has no patterns"
                )));
            }
            if rule.tasks.is_empty() {
                return Err(config_error(format!(
                    "task '{name}' watch rule #{idx} has no tasks"
                )));
            }
            for target in &rule.tasks {
                if !cfg.task.contains_key(target) {
                    return Err(PipeworksError::UnknownTask {
                        task: target.clone(),
                        required_by: Some(name.clone()),
                    });
                }
            }
            build_globset(&rule.patterns)
                .and_then(|_| build_globset(&rule.exclude))
                .map_err(|e| {
                    config_error(format!("task '{name}' watch rule #{idx}: {e:#}"))
                })?;
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PipeworksError::DagCycle {
            tasks: cycle_through(&graph, cycle.node_id()),
        }),
    }
}

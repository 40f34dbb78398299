// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod proxy;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{config_root_dir, load_and_validate};
use crate::config::model::ConfigFile;
use crate::dag::ExecutionPlan;
use crate::engine::{Runner, RunnerOptions};
use crate::errors::PipeworksError;
use crate::pipeline::Pipeline;
use crate::watch::{compile_rules, spawn_watcher, watch_roots, ChangeBatch, WatchDispatcher};

/// Task run when none is named on the command line.
pub const DEFAULT_TASK: &str = "default";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the task graph
/// - the initial run of the requested tasks
/// - (optional) file watcher and watch dispatcher
/// - Ctrl-C handling while watching or serving
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let root = project_root(&args.config);
    let pipeline = Pipeline::from_config(&cfg)?;

    let tasks = requested_tasks(&args, &cfg)?;
    let runner = Runner::new(pipeline.graph())
        .with_root(root.clone())
        .with_options(RunnerOptions {
            max_parallel: cfg.max_parallel(),
        });
    let plan = runner.plan(&tasks)?;

    if args.dry_run {
        print_dry_run(&cfg, &pipeline, &plan);
        return Ok(());
    }

    runner.run(&tasks).await?;

    if args.no_watch {
        debug!("--no-watch given; exiting after initial run");
        return Ok(());
    }

    let rules = pipeline.watch_rules_for(&plan);
    if rules.is_empty() && !pipeline.starts_service(&plan) {
        return Ok(());
    }

    // Watch rules are registered only after the initial run succeeded.
    let _watcher_handle = if rules.is_empty() {
        None
    } else {
        let compiled = compile_rules(rules)?;
        let roots = watch_roots(&root, &compiled);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel::<ChangeBatch>();
        let handle = spawn_watcher(&roots, cfg.debounce(), batch_tx)?;

        let overlap = args.watch_overlap.unwrap_or(cfg.watch_overlap());
        let dispatcher = WatchDispatcher::new(root.clone(), compiled, runner.clone(), overlap);
        tokio::spawn(dispatcher.run(batch_rx));
        Some(handle)
    };

    info!("initial run finished; watching for changes (Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("shutting down");
    Ok(())
}

/// Project root: the config file's directory, canonicalized so watcher
/// paths can be made relative to it.
fn project_root(config_path: &Path) -> PathBuf {
    let root = config_root_dir(config_path);
    root.canonicalize().unwrap_or(root)
}

fn requested_tasks(args: &CliArgs, cfg: &ConfigFile) -> std::result::Result<Vec<String>, PipeworksError> {
    if !args.tasks.is_empty() {
        return Ok(args.tasks.clone());
    }
    if cfg.task(DEFAULT_TASK).is_some() {
        return Ok(vec![DEFAULT_TASK.to_string()]);
    }
    Err(PipeworksError::ConfigError(format!(
        "no tasks given and no '{DEFAULT_TASK}' task defined"
    )))
}

/// Dry-run output: the plan in order, with each task's action and deps.
fn print_dry_run(cfg: &ConfigFile, pipeline: &Pipeline, plan: &ExecutionPlan) {
    println!("pipeworks dry-run");
    match cfg.max_parallel() {
        Some(n) => println!("  config.max_parallel = {n}"),
        None => println!("  config.max_parallel = unlimited"),
    }
    println!("  config.watch_overlap = {:?}", cfg.watch_overlap());
    println!("  config.debounce = {:?}", cfg.debounce());
    println!();

    let graph = pipeline.graph();
    println!("plan ({} tasks):", plan.len());
    for (idx, name) in plan.tasks().iter().enumerate() {
        println!("  {}. {name}", idx + 1);
        if let Some(desc) = graph.get(name).and_then(|def| def.action().describe()) {
            println!("      {desc}");
        }
        let deps = plan.dependencies_of(name);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        if pipeline.is_service(name) {
            println!("      service: true");
        }
    }

    let rules = pipeline.watch_rules_for(plan);
    if !rules.is_empty() {
        println!();
        println!("watch rules:");
        for rule in rules {
            println!("  {:?} -> {:?}", rule.patterns, rule.tasks);
            if !rule.exclude.is_empty() {
                println!("      exclude: {:?}", rule.exclude);
            }
        }
    }

    debug!("dry-run complete (no execution)");
}

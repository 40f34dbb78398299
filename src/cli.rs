// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::WatchOverlap;

/// Command-line arguments for `pipeworks`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipeworks",
    version,
    about = "Run front-end build tasks in dependency order, watch sources and live-reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to run. Defaults to the `default` task when one is defined.
    #[arg(value_name = "TASKS")]
    pub tasks: Vec<String>,

    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEWORKS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run the requested tasks once and exit, even if they declare watch
    /// rules or start services.
    #[arg(long)]
    pub no_watch: bool,

    /// Override `[config].watch_overlap` (serialize or concurrent).
    #[arg(long, value_name = "MODE")]
    pub watch_overlap: Option<WatchOverlap>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::bundler::BundlerSection;
use crate::proxy::{DEFAULT_HOST, DEFAULT_PORT};
use crate::types::{ReloadKind, WatchOverlap};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// max_parallel = 4
/// debounce = "200ms"
///
/// [proxy]
/// port = 8080
/// [[proxy.route]]
/// prefix = "/"
/// upstream = "http://localhost:3000"
///
/// [task."clean:css"]
/// clean = ["dist/css"]
///
/// [task.styles]
/// after = ["clean:css"]
/// cmd = "sass app/styles:dist/css"
/// reload = "css"
/// ```
///
/// All sections are optional and have reasonable defaults; validation
/// requires at least one task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Bundler base settings and profiles from `[bundler]`.
    #[serde(default)]
    pub bundler: BundlerSection,

    /// Dev proxy settings from `[proxy]`.
    #[serde(default)]
    pub proxy: Option<ProxySection>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    bundler: BundlerSection,
    proxy: Option<ProxySection>,
    task: BTreeMap<String, TaskConfig>,
    debounce: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, debounce: Duration) -> Self {
        Self {
            config: raw.config,
            bundler: raw.bundler,
            proxy: raw.proxy,
            task: raw.task,
            debounce,
        }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.config
    }

    pub fn bundler(&self) -> &BundlerSection {
        &self.bundler
    }

    pub fn proxy(&self) -> Option<&ProxySection> {
        self.proxy.as_ref()
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.get(name)
    }

    /// `None` means unlimited.
    pub fn max_parallel(&self) -> Option<usize> {
        Some(self.config.max_parallel).filter(|n| *n > 0)
    }

    pub fn watch_overlap(&self) -> WatchOverlap {
        self.config.watch_overlap
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Maximum number of concurrently running actions; `0` is unlimited.
    #[serde(default)]
    pub max_parallel: usize,

    /// `"serialize"` (default) or `"concurrent"`.
    #[serde(default)]
    pub watch_overlap: WatchOverlap,

    /// Debounce window for filesystem events, e.g. `"100ms"`.
    #[serde(default)]
    pub debounce: Option<String>,
}

/// `[proxy]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Static file root, relative to the project root.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// `[[proxy.route]]` entries, in declaration order.
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteConfig>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub prefix: String,
    pub upstream: String,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Shell command to run.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Directories whose contents are deleted.
    #[serde(default)]
    pub clean: Option<Vec<PathBuf>>,

    /// Start the dev proxy described by `[proxy]`.
    #[serde(default)]
    pub proxy: bool,

    /// Extra environment for `cmd`; overrides bundler variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Bundler profile whose settings are exported to `cmd`.
    #[serde(default)]
    pub bundle: Option<String>,

    /// The command keeps running after the task completes.
    #[serde(default)]
    pub long_lived: bool,

    /// Regex; the first matching stdout line marks a long-lived task ready.
    #[serde(default)]
    pub ready_on_stdout: Option<String>,

    /// Duration string (e.g. `"3s"`) after which a long-lived task is ready.
    #[serde(default)]
    pub ready_after: Option<String>,

    /// Kill and respawn a running long-lived command when run again.
    #[serde(default)]
    pub restart: bool,

    /// Reload signal sent after each successful run of `cmd`.
    #[serde(default)]
    pub reload: Option<ReloadKind>,

    /// Log failures instead of aborting the run.
    #[serde(default)]
    pub continue_on_error: bool,

    /// `[[task.<name>.watch]]` rules registered after this task succeeds.
    #[serde(default)]
    pub watch: Vec<WatchRuleConfig>,
}

/// What a task does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Dependencies only.
    Composite,
    Command,
    Clean,
    Proxy,
}

impl TaskConfig {
    /// The single action kind this task declares.
    pub fn action_kind(&self) -> Result<ActionKind, String> {
        let mut kinds = Vec::new();
        if self.cmd.is_some() {
            kinds.push(("cmd", ActionKind::Command));
        }
        if self.clean.is_some() {
            kinds.push(("clean", ActionKind::Clean));
        }
        if self.proxy {
            kinds.push(("proxy", ActionKind::Proxy));
        }

        match kinds.as_slice() {
            [] => Ok(ActionKind::Composite),
            [(_, kind)] => Ok(*kind),
            many => {
                let names: Vec<&str> = many.iter().map(|(n, _)| *n).collect();
                Err(format!("declares more than one action: {}", names.join(", ")))
            }
        }
    }

    /// Whether running this task leaves something alive afterwards.
    pub fn is_service(&self) -> bool {
        self.proxy || (self.cmd.is_some() && self.long_lived)
    }
}

/// `[[task.<name>.watch]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchRuleConfig {
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<String>,
}

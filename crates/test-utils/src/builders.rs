#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use pipeworks::config::{
    BundlerOverlay, ConfigFile, ProxySection, RawConfigFile, RouteConfig, TaskConfig,
    WatchRuleConfig,
};
use pipeworks::errors::Result;
use pipeworks::types::{ReloadKind, WatchOverlap};

/// Builder for `ConfigFile` to simplify test setup.
#[derive(Default)]
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.config.max_parallel = n;
        self
    }

    pub fn watch_overlap(mut self, overlap: WatchOverlap) -> Self {
        self.config.config.watch_overlap = overlap;
        self
    }

    pub fn debounce(mut self, value: &str) -> Self {
        self.config.config.debounce = Some(value.to_string());
        self
    }

    pub fn bundler_profile(mut self, name: &str, overlay: BundlerOverlay) -> Self {
        self.config.bundler.profiles.insert(name.to_string(), overlay);
        self
    }

    /// Add a `[proxy]` section on `port` with the given `(prefix, upstream)`
    /// routes.
    pub fn proxy(mut self, port: u16, routes: &[(&str, &str)]) -> Self {
        self.config.proxy = Some(ProxySection {
            host: "127.0.0.1".to_string(),
            port,
            base_dir: PathBuf::from("."),
            routes: routes
                .iter()
                .map(|(prefix, upstream)| RouteConfig {
                    prefix: prefix.to_string(),
                    upstream: upstream.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// Task with only dependencies.
    pub fn composite() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn cmd(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn clean(targets: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                clean: Some(targets.iter().map(PathBuf::from).collect()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn proxy() -> Self {
        Self {
            task: TaskConfig {
                proxy: true,
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn bundle(mut self, profile: &str) -> Self {
        self.task.bundle = Some(profile.to_string());
        self
    }

    pub fn long_lived(mut self, val: bool) -> Self {
        self.task.long_lived = val;
        self
    }

    pub fn ready_on_stdout(mut self, pattern: &str) -> Self {
        self.task.ready_on_stdout = Some(pattern.to_string());
        self
    }

    pub fn ready_after(mut self, value: &str) -> Self {
        self.task.ready_after = Some(value.to_string());
        self
    }

    pub fn restart(mut self, val: bool) -> Self {
        self.task.restart = val;
        self
    }

    pub fn reload(mut self, kind: ReloadKind) -> Self {
        self.task.reload = Some(kind);
        self
    }

    pub fn continue_on_error(mut self, val: bool) -> Self {
        self.task.continue_on_error = val;
        self
    }

    pub fn watch(mut self, patterns: &[&str], tasks: &[&str]) -> Self {
        self.task.watch.push(WatchRuleConfig {
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            tasks: tasks.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// `define` map from `(key, value)` pairs.
pub fn defines(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

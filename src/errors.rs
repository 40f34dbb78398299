// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum PipeworksError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A requested task, or a dependency of one, is not registered.
    #[error("{}", unknown_task_message(.task, .required_by.as_deref()))]
    UnknownTask {
        task: TaskName,
        required_by: Option<TaskName>,
    },

    /// The dependency graph reachable from the request contains a cycle.
    #[error("cycle detected in task graph: {}", .tasks.join(" -> "))]
    DagCycle { tasks: Vec<TaskName> },

    /// A task action reported failure and aborted the run.
    #[error("task '{name}' failed: {cause}")]
    TaskFailed {
        name: TaskName,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipeworksError {
    /// Wrap an action failure for the named task.
    pub fn task_failed(name: impl Into<TaskName>, cause: anyhow::Error) -> Self {
        PipeworksError::TaskFailed {
            name: name.into(),
            cause: cause.into(),
        }
    }
}

fn unknown_task_message(task: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(parent) => format!("task '{parent}' depends on unknown task '{task}'"),
        None => format!("unknown task '{task}'"),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipeworksError>;

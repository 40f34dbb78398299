// src/exec/mod.rs

//! Action execution layer.
//!
//! - [`action`] defines the [`TaskAction`] trait every task runs through,
//!   plus adapters for sync, callback, stream and async completion.
//! - [`executor`] spawns scheduled actions on the runtime and reports
//!   their outcome back to the runner.
//! - [`shell`] runs shell commands, including long-lived services with
//!   readiness detection.
//! - [`clean`] empties output directories.

pub mod action;
pub mod clean;
pub mod executor;
pub mod shell;

pub use action::{
    from_callback, from_fn, from_future, from_stream, noop, ActionFuture, Done, TaskAction,
    TaskContext,
};
pub use clean::CleanAction;
pub use executor::spawn_action;
pub use shell::{CommandFailed, ServiceExited, ServiceOptions, ShellAction, ShellSpec};

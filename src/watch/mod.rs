// src/watch/mod.rs

//! File watching and change dispatch.
//!
//! This module is responsible for:
//! - Compiling watch rules (`patterns` / `exclude` globs → task lists).
//! - Wiring up a debounced cross-platform filesystem watcher (`notify`).
//! - Dispatching change batches to rule reruns, serialized per rule.
//!
//! It does **not** know about task dependencies; it only turns filesystem
//! changes into runs of the rule's task list through the [`Runner`].
//!
//! [`Runner`]: crate::engine::Runner

pub mod dispatcher;
pub mod gate;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use dispatcher::{ChangeBatch, WatchDispatcher};
pub use gate::{GateDecision, RerunGate};
pub use patterns::{compile_rules, watch_roots, CompiledRule, WatchRule};
pub use watcher::{spawn_watcher, WatcherHandle};

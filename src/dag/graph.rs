// src/dag/graph.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::TaskName;
use crate::exec::action::{noop, TaskAction};

/// A registered task: its direct dependencies, its action, and whether a
/// failure of the action should abort the run.
#[derive(Clone)]
pub struct TaskDef {
    name: TaskName,
    deps: Vec<TaskName>,
    action: Arc<dyn TaskAction>,
    continue_on_error: bool,
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("continue_on_error", &self.continue_on_error)
            .finish_non_exhaustive()
    }
}

impl TaskDef {
    pub fn new<N, I, S, A>(name: N, deps: I, action: A) -> Self
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
        A: TaskAction + 'static,
    {
        let mut unique: Vec<TaskName> = Vec::new();
        for dep in deps {
            let dep = dep.into();
            if !unique.contains(&dep) {
                unique.push(dep);
            }
        }

        Self {
            name: name.into(),
            deps: unique,
            action: Arc::new(action),
            continue_on_error: false,
        }
    }

    /// A task with no action of its own that only aggregates dependencies.
    pub fn composite<N, I, S>(name: N, deps: I) -> Self
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        Self::new(name, deps, noop())
    }

    /// Log failures of this task instead of aborting the run.
    pub fn continue_on_error(mut self, yes: bool) -> Self {
        self.continue_on_error = yes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct dependencies, in declaration order.
    pub fn deps(&self) -> &[TaskName] {
        &self.deps
    }

    pub fn action(&self) -> Arc<dyn TaskAction> {
        Arc::clone(&self.action)
    }

    pub fn is_continue_on_error(&self) -> bool {
        self.continue_on_error
    }
}

/// Task registry keyed by name.
///
/// Registration order is remembered so listings and dry-run output are
/// stable. Registering a name twice replaces the earlier definition.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    tasks: HashMap<TaskName, TaskDef>,
    order: Vec<TaskName>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with the given dependencies and action.
    ///
    /// Dependencies do not need to exist yet; unknown names are reported when
    /// a run is resolved.
    pub fn register<N, I, S, A>(&mut self, name: N, deps: I, action: A) -> &mut Self
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
        A: TaskAction + 'static,
    {
        self.insert(TaskDef::new(name, deps, action))
    }

    /// Register a composite task (no action, dependencies only).
    pub fn register_composite<N, I, S>(&mut self, name: N, deps: I) -> &mut Self
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.insert(TaskDef::composite(name, deps))
    }

    /// Insert a fully built definition, replacing any task of the same name.
    pub fn insert(&mut self, def: TaskDef) -> &mut Self {
        let name = def.name.clone();
        if self.tasks.insert(name.clone(), def).is_some() {
            debug!(task = %name, "task registered again; replacing previous definition");
        } else {
            self.order.push(name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All task names in registration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task (empty for unknown names).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.tasks
            .get(name)
            .map(|t| t.deps.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::action::from_fn;

    #[test]
    fn duplicate_registration_overwrites_but_keeps_position() {
        let mut graph = Graph::new();
        graph
            .register("a", ["x"], from_fn(|_| Ok(())))
            .register("b", Vec::<String>::new(), from_fn(|_| Ok(())))
            .register("a", ["y", "z"], from_fn(|_| Ok(())));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.task_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(graph.dependencies_of("a"), ["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn repeated_dependencies_are_collapsed() {
        let def = TaskDef::composite("dev", ["images", "styles", "images"]);
        assert_eq!(def.deps(), ["images".to_string(), "styles".to_string()]);
    }

    #[test]
    fn unknown_task_has_no_dependencies() {
        let graph = Graph::new();
        assert!(graph.dependencies_of("missing").is_empty());
        assert!(!graph.contains("missing"));
    }
}

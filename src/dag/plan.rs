// src/dag/plan.rs

//! Dependency resolution: from a set of requested task names to an ordered
//! execution plan over their transitive dependency closure.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::dag::graph::Graph;
use crate::engine::TaskName;
use crate::errors::{PipeworksError, Result};

/// Topologically ordered list of the tasks a run will execute.
///
/// Every task appears exactly once and after all of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<TaskName>,
    deps: HashMap<TaskName, Vec<TaskName>>,
}

impl ExecutionPlan {
    /// Resolve `requested` against `graph`.
    ///
    /// Fails with [`PipeworksError::UnknownTask`] when a requested name or any
    /// dependency reachable from it is not registered, and with
    /// [`PipeworksError::DagCycle`] when the reachable subgraph has a cycle.
    pub fn resolve<S: AsRef<str>>(graph: &Graph, requested: &[S]) -> Result<Self> {
        let closure = dependency_closure(graph, requested)?;

        // Edge direction: dep -> task, so a topological order runs deps first.
        let mut dag: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in &closure {
            dag.add_node(name.as_str());
        }
        for name in &closure {
            for dep in graph.dependencies_of(name) {
                dag.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        let order = match toposort(&dag, None) {
            Ok(order) => order,
            Err(cycle) => {
                return Err(PipeworksError::DagCycle {
                    tasks: cycle_through(&dag, cycle.node_id()),
                });
            }
        };

        let deps = closure
            .iter()
            .map(|name| (name.clone(), graph.dependencies_of(name).to_vec()))
            .collect();

        Ok(Self {
            order: order.into_iter().map(str::to_string).collect(),
            deps,
        })
    }

    /// Task names in execution order.
    pub fn tasks(&self) -> &[TaskName] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deps.contains_key(name)
    }

    /// Index of `name` in the execution order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|t| t == name)
    }

    /// Direct dependencies of a planned task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.deps.get(name).map(|d| d.as_slice()).unwrap_or(&[])
    }
}

/// Collect every task reachable from `requested` through dependency edges,
/// in discovery order, validating that all of them are registered.
fn dependency_closure<S: AsRef<str>>(graph: &Graph, requested: &[S]) -> Result<Vec<TaskName>> {
    let mut seen: HashSet<TaskName> = HashSet::new();
    let mut closure = Vec::new();
    let mut stack: Vec<(TaskName, Option<TaskName>)> = requested
        .iter()
        .rev()
        .map(|n| (n.as_ref().to_string(), None))
        .collect();

    while let Some((name, required_by)) = stack.pop() {
        if seen.contains(&name) {
            continue;
        }
        let Some(def) = graph.get(&name) else {
            return Err(PipeworksError::UnknownTask {
                task: name,
                required_by,
            });
        };

        for dep in def.deps().iter().rev() {
            if !seen.contains(dep) {
                stack.push((dep.clone(), Some(name.clone())));
            }
        }
        seen.insert(name.clone());
        closure.push(name);
    }

    Ok(closure)
}

/// Find a concrete cycle passing through `start`, returned as a closed walk
/// (`[a, b, a]`) in dependency-edge direction.
pub(crate) fn cycle_through(dag: &DiGraphMap<&str, ()>, start: &str) -> Vec<TaskName> {
    if dag.contains_edge(start, start) {
        return vec![start.to_string(), start.to_string()];
    }

    let component: HashSet<&str> = tarjan_scc(dag)
        .into_iter()
        .find(|scc| scc.contains(&start))
        .map(|scc| scc.into_iter().collect())
        .unwrap_or_default();

    // Depth-first walk inside the strongly connected component until we get
    // back to `start`.
    let mut path = vec![start];
    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut frontier: Vec<Vec<&str>> = vec![successors_in(dag, start, &component)];

    while let Some(next) = frontier.last_mut() {
        match next.pop() {
            Some(node) if node == start => {
                path.push(start);
                return path.into_iter().map(str::to_string).collect();
            }
            Some(node) if !visited.contains(node) => {
                visited.insert(node);
                path.push(node);
                frontier.push(successors_in(dag, node, &component));
            }
            Some(_) => {}
            None => {
                frontier.pop();
                path.pop();
            }
        }
    }

    vec![start.to_string()]
}

fn successors_in<'a>(
    dag: &DiGraphMap<&'a str, ()>,
    node: &'a str,
    component: &HashSet<&'a str>,
) -> Vec<&'a str> {
    dag.neighbors_directed(node, Direction::Outgoing)
        .filter(|n| component.contains(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::action::noop;

    fn graph(edges: &[(&str, &[&str])]) -> Graph {
        let mut g = Graph::new();
        for (name, deps) in edges {
            g.register(*name, deps.iter().copied(), noop());
        }
        g
    }

    fn assert_deps_first(plan: &ExecutionPlan) {
        for name in plan.tasks() {
            let idx = plan.position(name).unwrap();
            for dep in plan.dependencies_of(name) {
                assert!(
                    plan.position(dep).unwrap() < idx,
                    "{dep} should come before {name} in {:?}",
                    plan.tasks()
                );
            }
        }
    }

    #[test]
    fn plan_covers_only_the_requested_closure() {
        let g = graph(&[
            ("clean:css", &[]),
            ("sass", &[]),
            ("styles", &["clean:css", "sass"]),
            ("images", &[]),
        ]);

        let plan = ExecutionPlan::resolve(&g, &["styles"]).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(!plan.contains("images"));
        assert_eq!(plan.tasks().last().map(String::as_str), Some("styles"));
        assert_deps_first(&plan);
    }

    #[test]
    fn shared_dependencies_appear_once() {
        let g = graph(&[
            ("clean:js", &[]),
            ("bundle", &["clean:js"]),
            ("dev-server", &["clean:js"]),
            ("all", &["bundle", "dev-server", "bundle"]),
        ]);

        let plan = ExecutionPlan::resolve(&g, &["all", "bundle", "all"]).unwrap();
        assert_eq!(plan.len(), 4);
        assert_deps_first(&plan);
    }

    #[test]
    fn unknown_dependency_names_the_referencing_task() {
        let g = graph(&[("build", &["missing"])]);

        match ExecutionPlan::resolve(&g, &["build"]) {
            Err(PipeworksError::UnknownTask { task, required_by }) => {
                assert_eq!(task, "missing");
                assert_eq!(required_by.as_deref(), Some("build"));
            }
            other => panic!("expected UnknownTask, got {other:?}"),
        }
    }

    #[test]
    fn unknown_requested_task() {
        let g = graph(&[("build", &[])]);
        match ExecutionPlan::resolve(&g, &["deploy"]) {
            Err(PipeworksError::UnknownTask { task, required_by }) => {
                assert_eq!(task, "deploy");
                assert!(required_by.is_none());
            }
            other => panic!("expected UnknownTask, got {other:?}"),
        }
    }

    #[test]
    fn two_task_cycle_is_reported_as_closed_walk() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);

        match ExecutionPlan::resolve(&g, &["a"]) {
            Err(PipeworksError::DagCycle { tasks }) => {
                assert_eq!(tasks.len(), 3);
                assert_eq!(tasks.first(), tasks.last());
                assert!(tasks.contains(&"a".to_string()));
                assert!(tasks.contains(&"b".to_string()));
            }
            other => panic!("expected DagCycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        match ExecutionPlan::resolve(&g, &["a"]) {
            Err(PipeworksError::DagCycle { tasks }) => assert_eq!(tasks, vec!["a", "a"]),
            other => panic!("expected DagCycle, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_cycle_does_not_block_resolution() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("ok", &[])]);
        let plan = ExecutionPlan::resolve(&g, &["ok"]).unwrap();
        assert_eq!(plan.tasks(), ["ok".to_string()]);
    }

    #[test]
    fn empty_request_gives_empty_plan() {
        let g = graph(&[("a", &[])]);
        let plan = ExecutionPlan::resolve::<&str>(&g, &[]).unwrap();
        assert!(plan.is_empty());
    }
}

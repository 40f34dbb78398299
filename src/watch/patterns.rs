// src/watch/patterns.rs

use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::engine::TaskName;

/// A registered watch rule: paths matching `patterns` (and none of
/// `exclude`) trigger a run of `tasks`.
///
/// Patterns are relative to the project root and use `/` separators, e.g.
/// `"app/styles/**/*"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    pub patterns: Vec<String>,
    pub exclude: Vec<String>,
    pub tasks: Vec<TaskName>,
}

impl WatchRule {
    pub fn new<P, T>(patterns: P, tasks: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<TaskName>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exclude<E>(mut self, exclude: E) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        self.exclude.extend(exclude.into_iter().map(Into::into));
        self
    }
}

/// A [`WatchRule`] with its globs compiled.
#[derive(Clone)]
pub struct CompiledRule {
    id: usize,
    rule: WatchRule,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.id)
            .field("patterns", &self.rule.patterns)
            .field("tasks", &self.rule.tasks)
            .finish_non_exhaustive()
    }
}

impl CompiledRule {
    pub fn compile(id: usize, rule: WatchRule) -> Result<Self> {
        let watch_set = build_globset(&rule.patterns)
            .with_context(|| format!("building watch globset for rule {id}"))?;
        let exclude_set = if rule.exclude.is_empty() {
            None
        } else {
            Some(
                build_globset(&rule.exclude)
                    .with_context(|| format!("building exclude globset for rule {id}"))?,
            )
        };

        Ok(Self {
            id,
            rule,
            watch_set,
            exclude_set,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn rule(&self) -> &WatchRule {
        &self.rule
    }

    pub fn tasks(&self) -> &[TaskName] {
        &self.rule.tasks
    }

    /// Returns true if the given path (relative to project root), e.g.
    /// `"app/styles/main.scss"`, should trigger this rule.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Compile every rule, numbering them in order.
pub fn compile_rules(rules: impl IntoIterator<Item = WatchRule>) -> Result<Vec<CompiledRule>> {
    rules
        .into_iter()
        .enumerate()
        .map(|(id, rule)| CompiledRule::compile(id, rule))
        .collect()
}

/// Build a GlobSet from simple string patterns.
pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Leading path components of a pattern that contain no glob syntax.
///
/// `"app/styles/**/*.scss"` → `"app/styles"`, `"**/*.js"` → `""`.
pub fn static_prefix(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| match c {
            Component::Normal(part) => !part
                .to_string_lossy()
                .contains(['*', '?', '[', '{']),
            _ => true,
        })
        .collect()
}

/// Directories to watch for a set of rules.
///
/// Each pattern contributes the closest existing directory at or above its
/// static prefix, never leaving `root`. Nested directories are collapsed
/// into their ancestors. With no rules nothing is watched.
pub fn watch_roots(root: &Path, rules: &[CompiledRule]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = rules
        .iter()
        .flat_map(|r| r.rule.patterns.iter())
        .map(|pattern| existing_dir(root, &root.join(static_prefix(pattern))))
        .collect();
    dirs.sort();
    dirs.dedup();

    let mut collapsed: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if let Some(last) = collapsed.last() {
            if dir.starts_with(last) {
                continue;
            }
        }
        collapsed.push(dir);
    }
    collapsed
}

fn existing_dir(root: &Path, candidate: &Path) -> PathBuf {
    candidate
        .ancestors()
        .take_while(|p| p.starts_with(root))
        .find(|p| p.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf())
}

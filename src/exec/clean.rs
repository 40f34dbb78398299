// src/exec/clean.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::exec::action::{ActionFuture, TaskAction, TaskContext};
use crate::fs::{FileSystem, RealFileSystem};

/// Empties target directories, keeping the directories themselves.
///
/// Relative targets resolve against the project root. A missing target is
/// not an error.
#[derive(Debug, Clone)]
pub struct CleanAction {
    targets: Vec<PathBuf>,
    fs: Arc<dyn FileSystem>,
}

impl CleanAction {
    pub fn new(targets: Vec<PathBuf>) -> Self {
        Self::with_fs(targets, Arc::new(RealFileSystem))
    }

    pub fn with_fs(targets: Vec<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self { targets, fs }
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }
}

impl TaskAction for CleanAction {
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let targets = self.targets.clone();
        let fs = Arc::clone(&self.fs);
        Box::pin(async move {
            let root = Arc::clone(&ctx.root);
            let removed =
                tokio::task::spawn_blocking(move || clean_targets(fs.as_ref(), &root, &targets))
                    .await
                    .context("clean worker panicked")??;
            info!(task = %ctx.task, run_id = ctx.run_id, removed, "clean finished");
            Ok(())
        })
    }

    fn describe(&self) -> Option<String> {
        let targets: Vec<String> = self
            .targets
            .iter()
            .map(|t| t.display().to_string())
            .collect();
        Some(format!("clean: {}", targets.join(", ")))
    }
}

/// Remove the contents of every target. Returns the number of top-level
/// entries removed.
pub fn clean_targets(fs: &dyn FileSystem, root: &Path, targets: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for target in targets {
        let dir = root.join(target);
        if !fs.exists(&dir) {
            debug!(target = %dir.display(), "clean target missing; nothing to do");
            continue;
        }
        if !fs.is_dir(&dir) {
            bail!("clean target {:?} is not a directory", dir);
        }

        for entry in fs.read_dir(&dir)? {
            if fs.is_dir(&entry) {
                fs.remove_dir_all(&entry)?;
            } else {
                fs.remove_file(&entry)?;
            }
            removed += 1;
        }
    }
    Ok(removed)
}

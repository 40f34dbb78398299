// src/watch/watcher.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::dispatcher::ChangeBatch;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying debouncer is kept alive for as
/// long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: Debouncer<RecommendedWatcher, RecommendedCache>,
    roots: Vec<PathBuf>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Watch `roots` recursively and send one [`ChangeBatch`] per debounce
/// window on `batch_tx`.
///
/// Only create, modify and remove events are forwarded; each path appears
/// at most once per batch.
pub fn spawn_watcher(
    roots: &[PathBuf],
    debounce: Duration,
    batch_tx: mpsc::UnboundedSender<ChangeBatch>,
) -> Result<WatcherHandle> {
    let mut debouncer = new_debouncer(debounce, None, move |res: DebounceEventResult| match res {
        Ok(events) => {
            let mut batch: ChangeBatch = Vec::new();
            for de in events.iter().filter(|de| {
                matches!(
                    de.event.kind,
                    EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                )
            }) {
                for path in &de.event.paths {
                    if !batch.contains(path) {
                        batch.push(path.clone());
                    }
                }
            }
            if batch.is_empty() {
                return;
            }
            debug!(paths = ?batch, "change batch");
            if batch_tx.send(batch).is_err() {
                debug!("watch dispatcher gone; dropping change batch");
            }
        }
        Err(errors) => {
            for e in errors {
                warn!(error = %e, "file watch error");
            }
        }
    })
    .context("creating file watcher")?;

    for root in roots {
        debouncer
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", root.display()))?;
        info!("watching {}", root.display());
    }

    Ok(WatcherHandle {
        _inner: debouncer,
        roots: roots.to_vec(),
    })
}

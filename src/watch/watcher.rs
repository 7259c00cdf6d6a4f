// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::errors::Result;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping the handle
/// stops watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    root: PathBuf,
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Watch `root` recursively and send the absolute path of every created,
/// modified, renamed or removed file on `paths_tx`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    paths_tx: mpsc::UnboundedSender<PathBuf>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Called synchronously on notify's own thread.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_content_change(&event.kind) {
                    trace!(kind = ?event.kind, "ignoring notify event");
                    return;
                }
                for path in event.paths {
                    if path.is_dir() {
                        continue;
                    }
                    if paths_tx.send(path).is_err() {
                        debug!("change consumer is gone; dropping notify event");
                        return;
                    }
                }
            }
            Err(err) => warn!("file watch error: {err}"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!("file watcher started on {:?}", root);

    Ok(WatcherHandle {
        _inner: watcher,
        root,
    })
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

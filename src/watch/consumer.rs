// src/watch/consumer.rs

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::Orchestrator;

/// Feed every changed path into the orchestrator's pending set. Execution
/// happens later, on the next drain.
pub fn spawn_change_consumer(
    mut paths_rx: mpsc::UnboundedReceiver<PathBuf>,
    orchestrator: Arc<Orchestrator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(path) = paths_rx.recv().await {
            if orchestrator.is_shutting_down() {
                break;
            }
            orchestrator.record_change(&path);
        }
        debug!("change consumer finished");
    })
}

// src/engine/refresh.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::engine::Orchestrator;

/// Drain the pending set every `period` until shutdown begins.
pub fn spawn_refresh_loop(orchestrator: Arc<Orchestrator>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?period, "auto-refresh started");

        let mut ticker = interval_at(Instant::now() + period, period);
        // A slow batch should not cause a burst of catch-up drains.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if orchestrator.is_shutting_down() {
                break;
            }
            let report = orchestrator.drain().await;
            if !report.is_empty() {
                debug!(runs = report.runs.len(), errors = report.errors.len(), "refresh drained batch");
            }
        }

        debug!("auto-refresh stopped");
    })
}

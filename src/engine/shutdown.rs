// src/engine/shutdown.rs

//! Startup hooks, termination signals and the shutdown sequence.

use anyhow::Result;
use tracing::{info, warn};

use crate::errors::WatchproxyError;
use crate::exec::CommandRunner;
use crate::rules::RuleTable;
use crate::types::RuleName;

/// Result of [`shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Rules whose exit hook ran successfully.
    pub hooks_run: Vec<RuleName>,
    /// Exit hooks that failed; they never stop the shutdown.
    pub hook_failures: Vec<WatchproxyError>,
}

/// Run every `on_init` hook once. The first failure aborts startup.
pub async fn run_init_hooks(rules: &RuleTable, runner: &dyn CommandRunner) -> Result<()> {
    for rule in rules.iter() {
        if let Some(hook) = &rule.on_init {
            info!(rule = %rule.name, "running init hook");
            runner.run_hook(hook, rule).await?;
        }
    }
    Ok(())
}

/// Kill every registered process, rule by rule, running each rule's exit
/// hook after its processes are gone.
pub async fn shutdown(rules: &RuleTable, runner: &dyn CommandRunner) -> ShutdownReport {
    runner.begin_shutdown();

    let mut report = ShutdownReport::default();
    for rule in rules.iter() {
        runner.kill_all(rule).await;

        let Some(hook) = &rule.on_exit else {
            continue;
        };
        info!(rule = %rule.name, "running exit hook");
        match runner.run_hook(hook, rule).await {
            Ok(()) => report.hooks_run.push(rule.name.clone()),
            Err(err) => {
                warn!(rule = %rule.name, error = %err, "exit hook failed");
                report.hook_failures.push(err);
            }
        }
    }

    info!("shutdown complete");
    report
}

/// Resolve once Ctrl-C or (on unix) SIGTERM arrives.
pub async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("termination requested");
    Ok(())
}

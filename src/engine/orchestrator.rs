// src/engine/orchestrator.rs

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::engine::shutdown::{self, ShutdownReport};
use crate::errors::WatchproxyError;
use crate::exec::{CommandRunner, RunOutcome};
use crate::rules::{Batch, ChainResolver, RuleTable, match_path};
use crate::types::{RenderedCommand, RuleName};

/// One rendered command that reached the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub rule: RuleName,
    pub command: RenderedCommand,
    pub outcome: RunOutcome,
}

/// Everything that happened during one batch and its continuations.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Commands in the order they were handed to the runner.
    pub runs: Vec<RunRecord>,
    /// Per-command failures (lexing, spawning) and continuation errors.
    pub errors: Vec<WatchproxyError>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.errors.is_empty()
    }

    /// Names of the rules that ran, in order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.rule.as_str()).collect()
    }
}

/// Shared state of a running service.
///
/// Owns the pending set and the run lock. File events insert into the
/// pending set under its own short lock; [`Orchestrator::drain`] swaps the
/// set out and executes it under the run lock, so matches that arrive while
/// a batch runs land in the fresh set and no two batches ever overlap.
pub struct Orchestrator {
    rules: Arc<RuleTable>,
    runner: Arc<dyn CommandRunner>,
    pending: Mutex<Batch>,
    run_lock: tokio::sync::Mutex<()>,
    shutting_down: AtomicBool,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("rules", &self.rules.len())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(rules: Arc<RuleTable>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            rules,
            runner,
            pending: Mutex::new(Batch::new()),
            run_lock: tokio::sync::Mutex::new(()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.rules
    }

    fn pending(&self) -> MutexGuard<'_, Batch> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Match a changed path into the pending set. Returns how many new
    /// commands became pending.
    pub fn record_change(&self, path: &Path) -> usize {
        if self.is_shutting_down() {
            return 0;
        }
        let path = path.to_string_lossy();
        let inserted = match_path(&path, &self.rules, &mut self.pending());
        if inserted > 0 {
            debug!(path = %path, inserted, "change queued");
        }
        inserted
    }

    /// Merge an already matched batch into the pending set.
    pub fn enqueue(&self, batch: Batch) {
        let mut pending = self.pending();
        for (rendered, rule) in batch {
            pending.entry(rendered).or_insert(rule);
        }
    }

    /// Execute everything pending, exclusively.
    ///
    /// Always waits for a batch that is already executing, even when
    /// nothing new is pending, so a caller never proceeds while a rebuild
    /// is still in flight.
    pub async fn drain(&self) -> DrainReport {
        let batch = std::mem::take(&mut *self.pending());

        let _running = self.run_lock.lock().await;
        if batch.is_empty() || self.is_shutting_down() {
            return DrainReport::default();
        }
        self.execute_chain(batch).await
    }

    /// Execute `batch` and its continuations under the run lock, bypassing
    /// the pending set.
    pub async fn run_batch(&self, batch: Batch) -> DrainReport {
        let _running = self.run_lock.lock().await;
        if batch.is_empty() || self.is_shutting_down() {
            return DrainReport::default();
        }
        self.execute_chain(batch).await
    }

    async fn execute_chain(&self, batch: Batch) -> DrainReport {
        let mut report = DrainReport::default();
        let mut resolver = ChainResolver::new(&self.rules);
        let mut current = batch;

        info!(commands = current.len(), "executing batch");

        while !current.is_empty() {
            for (rendered, rule) in &current {
                if self.is_shutting_down() {
                    debug!("shutdown began; abandoning batch");
                    report.errors.extend(resolver.into_errors());
                    return report;
                }

                match self.runner.run(rendered, rule).await {
                    Ok(outcome) => report.runs.push(RunRecord {
                        rule: rule.name.clone(),
                        command: rendered.clone(),
                        outcome,
                    }),
                    Err(err) => {
                        error!(rule = %rule.name, cmd = %rendered, error = %err, "command did not run");
                        report.errors.push(err);
                    }
                }
            }

            current = resolver.next_batch(&current);
        }

        report.errors.extend(resolver.into_errors());
        report
    }

    /// Stop accepting work, kill every background process and run exit
    /// hooks. Does not wait for an executing batch.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.pending().clear();
        shutdown::shutdown(&self.rules, self.runner.as_ref()).await
    }
}

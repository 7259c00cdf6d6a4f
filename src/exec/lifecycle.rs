// src/exec/lifecycle.rs

//! Spawning, tracking and killing the processes behind rules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::errors::{Result, WatchproxyError};
use crate::exec::process::{self, ProcessGroup};
use crate::exec::runner::{CommandRunner, RunFuture, RunOutcome};
use crate::rules::{Rule, RuleTable};
use crate::types::{RenderedCommand, RuleName};

type Registry = HashMap<RuleName, HashMap<RenderedCommand, ProcessGroup>>;

/// Owns every live background-mode process.
///
/// Invariant: at most one live process per (rule, rendered command). A
/// rerun removes and kills the old entry, waiting for the group to die,
/// before the replacement is spawned. Wait-mode processes are never
/// registered.
#[derive(Debug)]
pub struct LifecycleManager {
    rules: Arc<RuleTable>,
    running: Mutex<Registry>,
    shutting_down: AtomicBool,
}

impl LifecycleManager {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self {
            rules,
            running: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, rule: &str, rendered: &str) -> Option<ProcessGroup> {
        let mut registry = self.registry();
        let entries = registry.get_mut(rule)?;
        let group = entries.remove(rendered);
        if entries.is_empty() {
            registry.remove(rule);
        }
        group
    }

    /// Pid of the live instance of `rendered`, if one is registered.
    pub fn running_pid(&self, rule: &str, rendered: &str) -> Option<u32> {
        self.registry()
            .get(rule)
            .and_then(|entries| entries.get(rendered))
            .and_then(ProcessGroup::id)
    }

    /// Number of live instances registered for `rule`.
    pub fn running_count(&self, rule: &str) -> usize {
        self.registry().get(rule).map_or(0, HashMap::len)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub async fn run(&self, rendered: &str, rule: &Rule) -> Result<RunOutcome> {
        if !rule.wait {
            self.replace_existing(rendered, rule).await;
        }

        if self.is_shutting_down() {
            debug!(rule = %rule.name, cmd = %rendered, "shutting down; not starting command");
            return Ok(RunOutcome::Skipped);
        }

        let mut cmd = process::command_for(rendered, rule)?;
        info!(rule = %rule.name, cmd = %rendered, wait = rule.wait, "running command");

        if rule.wait {
            let mut child = process::spawn_logged(&mut cmd, rendered, &rule.name)?;
            let status = child.wait().await?;
            let code = status.code().unwrap_or(-1);
            if status.success() {
                debug!(rule = %rule.name, cmd = %rendered, "command finished");
                return Ok(RunOutcome::Succeeded);
            }
            warn!(rule = %rule.name, cmd = %rendered, exit_code = code, "command failed");
            return Ok(RunOutcome::Failed(code));
        }

        let group = ProcessGroup::spawn(cmd, rendered, &rule.name)?;
        let pid = group.id();

        let (raced_shutdown, displaced) = {
            let mut registry = self.registry();
            if self.is_shutting_down() {
                (Some(group), None)
            } else {
                let displaced = registry
                    .entry(rule.name.clone())
                    .or_default()
                    .insert(rendered.to_string(), group);
                (None, displaced)
            }
        };

        if let Some(group) = raced_shutdown {
            warn!(rule = %rule.name, cmd = %rendered, "shutdown began while spawning; killing");
            if let Err(err) = group.terminate().await {
                warn!(rule = %rule.name, cmd = %rendered, error = %err, "failed to reap command spawned during shutdown");
            }
            return Ok(RunOutcome::Skipped);
        }

        // A concurrent run of the same command registered first.
        if let Some(old) = displaced {
            info!(rule = %rule.name, cmd = %rendered, "killing concurrently started instance");
            if let Err(err) = old.terminate().await {
                warn!(rule = %rule.name, cmd = %rendered, error = %err, "failed to reap displaced instance");
            }
        }

        debug!(rule = %rule.name, cmd = %rendered, ?pid, "background command registered");
        Ok(RunOutcome::Spawned)
    }

    /// Kill the previous instance of `rendered` together with the live
    /// background instances further down its continuation chain.
    async fn replace_existing(&self, rendered: &str, rule: &Rule) {
        let Some(previous) = self.take(&rule.name, rendered) else {
            return;
        };

        self.kill_downstream(rule).await;

        info!(rule = %rule.name, cmd = %rendered, "killing previous instance");
        if let Err(err) = previous.terminate().await {
            warn!(rule = %rule.name, cmd = %rendered, error = %err, "failed to reap previous instance");
        }
    }

    async fn kill_downstream(&self, rule: &Rule) {
        let mut seen: HashSet<&str> = HashSet::from([rule.name.as_str()]);
        let mut next = rule.continuation.as_deref();

        while let Some(name) = next {
            let Some(target) = self.rules.get(name) else {
                break;
            };
            if target.wait || !seen.insert(target.name.as_str()) {
                break;
            }
            let Some(group) = self.take(&target.name, &target.command) else {
                break;
            };

            info!(rule = %target.name, cmd = %target.command, upstream = %rule.name, "killing downstream instance");
            if let Err(err) = group.terminate().await {
                warn!(rule = %target.name, error = %err, "failed to reap downstream instance");
            }
            next = target.continuation.as_deref();
        }
    }

    pub async fn kill(&self, rendered: &str, rule: &Rule) {
        if let Some(group) = self.take(&rule.name, rendered) {
            info!(rule = %rule.name, cmd = %rendered, "killing command");
            if let Err(err) = group.terminate().await {
                warn!(rule = %rule.name, cmd = %rendered, error = %err, "failed to reap killed command");
            }
        }
    }

    pub async fn kill_all(&self, rule: &Rule) {
        let groups = self.registry().remove(&rule.name).unwrap_or_default();

        for (rendered, group) in groups {
            info!(rule = %rule.name, cmd = %rendered, "killing command");
            if let Err(err) = group.terminate().await {
                warn!(rule = %rule.name, cmd = %rendered, error = %err, "failed to reap killed command");
            }
        }
    }

    pub async fn run_hook(&self, hook: &str, rule: &Rule) -> Result<()> {
        let mut cmd = process::shell_command(hook);
        process::configure(&mut cmd, rule);

        info!(rule = %rule.name, hook, "running hook");
        let mut child = process::spawn_logged(&mut cmd, hook, &rule.name)?;
        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(WatchproxyError::HookFailed {
                rule: rule.name.clone(),
                code: status.code().unwrap_or(-1),
            })
        }
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}

impl CommandRunner for LifecycleManager {
    fn run<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<RunOutcome>> {
        Box::pin(LifecycleManager::run(self, rendered, rule))
    }

    fn kill<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, ()> {
        Box::pin(LifecycleManager::kill(self, rendered, rule))
    }

    fn kill_all<'a>(&'a self, rule: &'a Rule) -> RunFuture<'a, ()> {
        Box::pin(LifecycleManager::kill_all(self, rule))
    }

    fn run_hook<'a>(&'a self, hook: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<()>> {
        Box::pin(LifecycleManager::run_hook(self, hook, rule))
    }

    fn begin_shutdown(&self) {
        LifecycleManager::begin_shutdown(self);
    }
}

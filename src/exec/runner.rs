// src/exec/runner.rs

//! The seam between the orchestrator and real processes.
//!
//! Production code uses [`crate::exec::LifecycleManager`]; tests provide a
//! recording implementation that never spawns anything.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::rules::Rule;

/// Boxed future returned by [`CommandRunner`] methods.
pub type RunFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What happened to one rendered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Wait-mode command exited with status 0.
    Succeeded,
    /// Wait-mode command exited non-zero (-1 when killed by a signal).
    Failed(i32),
    /// Background-mode command was spawned and registered.
    Spawned,
    /// Not started because shutdown has begun.
    Skipped,
}

pub trait CommandRunner: Send + Sync {
    /// Run `rendered` under `rule`'s policy, replacing a live background
    /// instance of the same command first.
    fn run<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<RunOutcome>>;

    /// Terminate the live instance of `rendered`, if any.
    fn kill<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, ()>;

    /// Terminate every live instance belonging to `rule`.
    fn kill_all<'a>(&'a self, rule: &'a Rule) -> RunFuture<'a, ()>;

    /// Run an init/exit hook through the shell and wait for it.
    fn run_hook<'a>(&'a self, hook: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<()>>;

    /// Refuse to start anything from now on.
    fn begin_shutdown(&self);
}

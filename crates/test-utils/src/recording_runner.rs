use std::collections::HashSet;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use watchproxy::errors::{Result, WatchproxyError};
use watchproxy::exec::{CommandRunner, RunFuture, RunOutcome};
use watchproxy::rules::Rule;

/// Everything a [`RecordingRunner`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run { rule: String, command: String },
    Kill { rule: String, command: String },
    KillAll { rule: String },
    Hook { rule: String, hook: String },
}

/// A `CommandRunner` that spawns nothing.
///
/// - records every call in order
/// - optionally sleeps in `run` so tests can observe overlap
/// - fails `run` for commands registered with [`RecordingRunner::fail_command`]
/// - fails hooks registered with [`RecordingRunner::fail_hook`]
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Call>>,
    delay: Duration,
    failing_commands: HashSet<String>,
    failing_hooks: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    shutting_down: AtomicBool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_command(mut self, rendered: &str) -> Self {
        self.failing_commands.insert(rendered.to_string());
        self
    }

    pub fn fail_hook(mut self, hook: &str) -> Self {
        self.failing_hooks.insert(hook.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `(rule, command)` for every `run` call, in order.
    pub fn runs(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Run { rule, command } => Some((rule, command)),
                _ => None,
            })
            .collect()
    }

    /// Highest number of `run` calls that were in progress at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl CommandRunner for RecordingRunner {
    fn run<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            if self.is_shutting_down() {
                return Ok(RunOutcome::Skipped);
            }
            self.record(Call::Run {
                rule: rule.name.clone(),
                command: rendered.to_string(),
            });

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing_commands.contains(rendered) {
                return Err(WatchproxyError::Spawn {
                    cmd: rendered.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "recording runner failure"),
                });
            }
            Ok(if rule.wait {
                RunOutcome::Succeeded
            } else {
                RunOutcome::Spawned
            })
        })
    }

    fn kill<'a>(&'a self, rendered: &'a str, rule: &'a Rule) -> RunFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Kill {
                rule: rule.name.clone(),
                command: rendered.to_string(),
            });
        })
    }

    fn kill_all<'a>(&'a self, rule: &'a Rule) -> RunFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::KillAll {
                rule: rule.name.clone(),
            });
        })
    }

    fn run_hook<'a>(&'a self, hook: &'a str, rule: &'a Rule) -> RunFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::Hook {
                rule: rule.name.clone(),
                hook: hook.to_string(),
            });
            if self.failing_hooks.contains(hook) {
                return Err(WatchproxyError::HookFailed {
                    rule: rule.name.clone(),
                    code: 1,
                });
            }
            Ok(())
        })
    }

    fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}

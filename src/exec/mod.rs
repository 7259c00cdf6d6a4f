// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`lexer`] splits rendered command strings into argv.
//! - [`process`] builds `tokio::process::Command`s for rules and owns
//!   process groups.
//! - [`lifecycle`] is the registry of live background processes and the
//!   production [`CommandRunner`].
//! - [`runner`] defines the `CommandRunner` seam used by the orchestrator.

pub mod lexer;
pub mod lifecycle;
pub mod process;
pub mod runner;

pub use lexer::{LexError, tokenize};
pub use lifecycle::LifecycleManager;
pub use runner::{CommandRunner, RunFuture, RunOutcome};

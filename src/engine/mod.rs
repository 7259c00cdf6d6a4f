// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`orchestrator`] owns the pending set and the run lock, and executes
//!   batches together with their continuation chains.
//! - [`refresh`] drains the pending set on a timer.
//! - [`shutdown`] runs init hooks, waits for termination signals and kills
//!   everything on the way out.
//!
//! The proxy is the other caller of [`Orchestrator::drain`].

pub mod orchestrator;
pub mod refresh;
pub mod shutdown;

pub use orchestrator::{DrainReport, Orchestrator, RunRecord};
pub use refresh::spawn_refresh_loop;
pub use shutdown::{ShutdownReport, run_init_hooks, wait_for_signal};

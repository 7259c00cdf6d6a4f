// src/watch/mod.rs

//! File watching.
//!
//! Turns filesystem activity under the root into absolute paths and feeds
//! them to the orchestrator. Knows nothing about processes.

pub mod consumer;
pub mod scan;
pub mod watcher;

pub use consumer::spawn_change_consumer;
pub use scan::scan_tree;
pub use watcher::{WatcherHandle, spawn_watcher};

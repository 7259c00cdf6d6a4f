// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::types::{PortSpec, parse_duration};

/// Command-line arguments for `watchproxy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchproxy",
    version,
    about = "Rebuild and restart on file changes, behind a proxy that waits for the rebuild.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Watchproxy.toml")]
    pub config: String,

    /// Proxy and application ports, `DEV[:APP]`.
    ///
    /// An empty DEV means 8080; a missing APP means DEV+1.
    #[arg(short, long, value_name = "DEV[:APP]")]
    pub port: Option<PortSpec>,

    /// How often pending changes are executed, e.g. `500ms` or `2s`.
    #[arg(short = 't', long, value_name = "DURATION", value_parser = parse_duration)]
    pub refresh: Option<Duration>,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHPROXY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print the rules, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    /// `--log-level` wins over `--verbose`.
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level),
            (None, true) => Some(LogLevel::Debug),
            (None, false) => None,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

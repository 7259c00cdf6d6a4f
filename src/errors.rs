// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

use crate::exec::lexer::LexError;

#[derive(Error, Debug)]
pub enum WatchproxyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Continuation cycle: {0}")]
    ContinuationCycle(String),

    #[error("Command syntax error: {0}")]
    Syntax(#[from] LexError),

    #[error("Failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Hook for rule '{rule}' exited with status {code}")]
    HookFailed { rule: String, code: i32 },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchproxyError>;

// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;
use tracing::warn;

use crate::config::env::parse_entry;
use crate::config::model::ConfigFile;
use crate::errors::{Result, WatchproxyError};
use crate::types::parse_duration;

/// Semantic checks on a parsed configuration.
///
/// Checks:
/// - there is at least one rule, and every rule has a name and a command
/// - `match` patterns compile
/// - `continue` targets exist and the continuation graph has no cycles
/// - `env` entries are `KEY=VALUE`
/// - `refresh` parses as a duration
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_rules(cfg)?;
    validate_service(cfg)?;
    validate_rules(cfg)?;
    validate_continuations(cfg)?;
    warn_unreachable(cfg);
    Ok(())
}

fn ensure_has_rules(cfg: &ConfigFile) -> Result<()> {
    if cfg.rule.is_empty() {
        return Err(WatchproxyError::ConfigError(
            "config must contain at least one [rule.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_service(cfg: &ConfigFile) -> Result<()> {
    if let Some(refresh) = &cfg.service.refresh {
        parse_duration(refresh).map_err(|e| {
            WatchproxyError::ConfigError(format!("invalid [service].refresh: {e}"))
        })?;
    }

    for entry in &cfg.service.env {
        parse_entry(entry)
            .map_err(|e| WatchproxyError::ConfigError(format!("[service].env: {e}")))?;
    }

    if cfg.service.app_port.is_some() && cfg.service.dev_port.is_none() {
        warn!("[service].app_port is set without dev_port; the proxy stays off");
    }
    Ok(())
}

fn validate_rules(cfg: &ConfigFile) -> Result<()> {
    for (name, rule) in cfg.rule.iter() {
        if name.trim().is_empty() {
            return Err(WatchproxyError::ConfigError(
                "rule names must not be empty".to_string(),
            ));
        }
        if rule.cmd.trim().is_empty() {
            return Err(WatchproxyError::ConfigError(format!(
                "rule '{name}' has an empty `cmd`"
            )));
        }
        if let Some(pattern) = &rule.pattern {
            Regex::new(pattern).map_err(|e| {
                WatchproxyError::ConfigError(format!(
                    "rule '{name}' has an invalid `match` pattern: {e}"
                ))
            })?;
        }
        for entry in &rule.env {
            parse_entry(entry).map_err(|e| {
                WatchproxyError::ConfigError(format!("rule '{name}' env: {e}"))
            })?;
        }
    }
    Ok(())
}

fn validate_continuations(cfg: &ConfigFile) -> Result<()> {
    // Edge direction: rule -> its continuation.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.rule.keys() {
        graph.add_node(name.as_str());
    }

    for (name, rule) in cfg.rule.iter() {
        let Some(next) = rule.next.as_deref() else {
            continue;
        };
        if !cfg.rule.contains_key(next) {
            return Err(WatchproxyError::ConfigError(format!(
                "rule '{name}' continues to unknown rule '{next}'"
            )));
        }
        if next == name {
            return Err(WatchproxyError::ContinuationCycle(format!(
                "rule '{name}' continues to itself"
            )));
        }
        graph.add_edge(name.as_str(), next, ());
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        WatchproxyError::ContinuationCycle(format!(
            "cycle detected in continuation chain involving rule '{}'",
            cycle.node_id()
        ))
    })
}

fn warn_unreachable(cfg: &ConfigFile) {
    for (name, rule) in cfg.rule.iter() {
        let is_target = cfg
            .rule
            .values()
            .any(|other| other.next.as_deref() == Some(name.as_str()));
        if rule.pattern.is_none() && !is_target {
            warn!(rule = %name, "rule has no `match` and is no rule's `continue`; it never runs");
        }
    }
}

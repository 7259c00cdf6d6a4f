// src/config/service.rs

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::config::env::{self, EnvList};
use crate::config::model::{ConfigFile, RuleConfig};
use crate::errors::{Result, WatchproxyError};
use crate::rules::{Rule, RuleTable};
use crate::types::{PortSpec, parse_duration};

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(2);

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ServiceOverrides {
    pub port: Option<PortSpec>,
    pub refresh: Option<Duration>,
}

/// The runtime view of a configuration: resolved paths, composed
/// environments and compiled rules.
#[derive(Debug, Clone)]
pub struct Service {
    /// `None` disables the proxy; changes are still acted on.
    pub ports: Option<PortSpec>,
    pub refresh: Duration,
    pub root: PathBuf,
    pub env: EnvList,
    pub rules: Arc<RuleTable>,
}

impl Service {
    /// Build from a validated config.
    ///
    /// `base_dir` is the directory relative paths in the config resolve
    /// against (normally the config file's directory). `process_env` is the
    /// environment every composed environment starts from.
    pub fn build(
        cfg: &ConfigFile,
        base_dir: &Path,
        process_env: &[(String, String)],
        overrides: &ServiceOverrides,
    ) -> Result<Service> {
        let service_env = env::extend(process_env, &cfg.service.env)?;

        let root = match cfg.service.dir.as_deref() {
            Some(dir) => resolve_dir(base_dir, &env::expand(dir, &service_env)),
            None => base_dir.to_path_buf(),
        };
        let root = root.canonicalize().map_err(|e| {
            WatchproxyError::ConfigError(format!(
                "cannot use {} as the watch root: {e}",
                root.display()
            ))
        })?;

        let refresh = match (overrides.refresh, cfg.service.refresh.as_deref()) {
            (Some(refresh), _) => refresh,
            (None, Some(s)) => parse_duration(s)
                .map_err(|e| WatchproxyError::ConfigError(format!("[service].refresh: {e}")))?,
            (None, None) => DEFAULT_REFRESH,
        };

        let ports = match overrides.port {
            Some(port) => Some(port),
            None => match cfg.service.dev_port {
                Some(dev) => {
                    let app = match cfg.service.app_port {
                        Some(app) => app,
                        None => PortSpec::app_for(dev).map_err(WatchproxyError::ConfigError)?,
                    };
                    Some(PortSpec { dev, app })
                }
                None => None,
            },
        };

        let mut rules = Vec::with_capacity(cfg.rule.len());
        for (name, rule_cfg) in cfg.rule.iter() {
            rules.push(build_rule(name, rule_cfg, &root, &service_env)?);
        }

        debug!(root = %root.display(), rules = rules.len(), "service built");

        Ok(Service {
            ports,
            refresh,
            root,
            env: env::dedup(&service_env),
            rules: Arc::new(RuleTable::new(rules)),
        })
    }

    /// Address the proxy forwards to.
    pub fn app_addr(&self) -> Option<SocketAddr> {
        self.ports
            .map(|p| SocketAddr::from(([127, 0, 0, 1], p.app)))
    }

    /// Address the proxy listens on.
    pub fn dev_addr(&self) -> Option<SocketAddr> {
        self.ports.map(|p| SocketAddr::from(([0, 0, 0, 0], p.dev)))
    }
}

fn build_rule(
    name: &str,
    cfg: &RuleConfig,
    root: &Path,
    service_env: &[(String, String)],
) -> Result<Rule> {
    let rule_env = env::extend(service_env, &cfg.env)?;

    let pattern = cfg
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| {
            WatchproxyError::ConfigError(format!("rule '{name}' has an invalid `match`: {e}"))
        })?;

    let dir = match cfg.dir.as_deref() {
        Some(dir) => resolve_dir(root, &env::expand(dir, &rule_env)),
        None => root.to_path_buf(),
    };

    let hook = |s: &Option<String>| s.as_deref().map(|cmd| env::expand(cmd, &rule_env));

    Ok(Rule {
        name: name.to_string(),
        command: env::expand(&cfg.cmd, &rule_env),
        pattern,
        continuation: cfg.next.clone(),
        wait: cfg.wait,
        capture_stdout: cfg.stdout,
        capture_stderr: cfg.stderr,
        shell: cfg.shell,
        dir,
        on_init: hook(&cfg.on_init),
        on_exit: hook(&cfg.on_exit),
        env: env::dedup(&rule_env),
    })
}

fn resolve_dir(base: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

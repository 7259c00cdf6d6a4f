// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::validate::validate_config;
use crate::errors::WatchproxyError;

/// Configuration as read from `Watchproxy.toml`, before validation.
///
/// ```toml
/// [service]
/// dev_port = 8080
/// app_port = 8888
/// refresh = "2s"
///
/// [rule.build]
/// match = '\.go$'
/// cmd = "go build -o app"
/// continue = "serve"
/// wait = true
///
/// [rule.serve]
/// cmd = "./app"
/// stdout = true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub service: ServiceSection,

    /// All rules from `[rule.<name>]`, keyed by rule name.
    #[serde(default)]
    pub rule: BTreeMap<String, RuleConfig>,
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceSection {
    /// Port the proxy listens on. Without it there is no proxy.
    #[serde(default)]
    pub dev_port: Option<u16>,

    /// Port of the application behind the proxy; defaults to `dev_port + 1`.
    #[serde(default)]
    pub app_port: Option<u16>,

    /// How often pending work is drained, e.g. `"2s"`.
    #[serde(default)]
    pub refresh: Option<String>,

    /// Directory to watch, relative to the config file.
    #[serde(default)]
    pub dir: Option<String>,

    /// `KEY=VALUE` entries appended to the process environment.
    #[serde(default)]
    pub env: Vec<String>,
}

/// `[rule.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Regex tested against changed paths. Without it the rule can only run
    /// as a continuation.
    #[serde(default, rename = "match")]
    pub pattern: Option<String>,

    /// Command template.
    pub cmd: String,

    /// Rule to run after this one.
    #[serde(default, rename = "continue")]
    pub next: Option<String>,

    /// Block until the command exits instead of running it in the background.
    #[serde(default)]
    pub wait: bool,

    #[serde(default)]
    pub stdout: bool,

    #[serde(default)]
    pub stderr: bool,

    /// Run through `sh -c` rather than splitting the command ourselves.
    #[serde(default)]
    pub shell: bool,

    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default)]
    pub env: Vec<String>,

    #[serde(default)]
    pub on_init: Option<String>,

    #[serde(default)]
    pub on_exit: Option<String>,
}

impl RuleConfig {
    /// A rule running `cmd` with every option at its default.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            pattern: None,
            cmd: cmd.into(),
            next: None,
            wait: false,
            stdout: false,
            stderr: false,
            shell: false,
            dir: None,
            env: Vec::new(),
            on_init: None,
            on_exit: None,
        }
    }

    /// Empty strings in the TOML mean "unset".
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.pattern,
            &mut self.next,
            &mut self.dir,
            &mut self.on_init,
            &mut self.on_exit,
        ] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }
}

/// A validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub service: ServiceSection,
    pub rule: BTreeMap<String, RuleConfig>,
}

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WatchproxyError;

    fn try_from(raw: RawConfigFile) -> Result<Self, Self::Error> {
        let mut service = raw.service;
        for field in [&mut service.refresh, &mut service.dir] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }

        let config = ConfigFile {
            service,
            rule: raw
                .rule
                .into_iter()
                .map(|(name, rule)| (name, rule.normalized()))
                .collect(),
        };

        validate_config(&config)?;
        Ok(config)
    }
}

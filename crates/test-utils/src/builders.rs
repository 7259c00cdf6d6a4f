use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use watchproxy::config::{ConfigFile, RawConfigFile, RuleConfig, ServiceSection};
use watchproxy::errors::Result;
use watchproxy::rules::{Rule, RuleTable};

/// Builder for a runtime `Rule`, bypassing config loading.
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    /// Background-mode rule with no pattern, running in the current directory.
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            rule: Rule {
                name: name.to_string(),
                pattern: None,
                command: command.to_string(),
                continuation: None,
                wait: false,
                capture_stdout: false,
                capture_stderr: false,
                shell: false,
                dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                env: std::env::vars().collect(),
                on_init: None,
                on_exit: None,
            },
        }
    }

    pub fn matching(mut self, pattern: &str) -> Self {
        self.rule.pattern = Some(Regex::new(pattern).expect("test pattern must compile"));
        self
    }

    pub fn then(mut self, next: &str) -> Self {
        self.rule.continuation = Some(next.to_string());
        self
    }

    pub fn wait(mut self) -> Self {
        self.rule.wait = true;
        self
    }

    pub fn shell(mut self) -> Self {
        self.rule.shell = true;
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rule.dir = dir.into();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.rule.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn on_init(mut self, hook: &str) -> Self {
        self.rule.on_init = Some(hook.to_string());
        self
    }

    pub fn on_exit(mut self, hook: &str) -> Self {
        self.rule.on_exit = Some(hook.to_string());
        self
    }

    pub fn build(self) -> Rule {
        self.rule
    }
}

pub fn rule_table(rules: impl IntoIterator<Item = Rule>) -> Arc<RuleTable> {
    Arc::new(RuleTable::new(rules))
}

/// Builder for `ConfigFile` to simplify test setup.
#[derive(Default)]
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                service: ServiceSection::default(),
                rule: BTreeMap::new(),
            },
        }
    }

    pub fn with_rule(mut self, name: &str, rule: RuleConfig) -> Self {
        self.config.rule.insert(name.to_string(), rule);
        self
    }

    pub fn with_dev_port(mut self, port: u16) -> Self {
        self.config.service.dev_port = Some(port);
        self
    }

    pub fn with_refresh(mut self, refresh: &str) -> Self {
        self.config.service.refresh = Some(refresh.to_string());
        self
    }

    pub fn with_service_env(mut self, entry: &str) -> Self {
        self.config.service.env.push(entry.to_string());
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }
}

// src/rules/rule.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::types::{RenderedCommand, RuleName};

/// Work keyed by rendered command string. Redundant matches collapse onto
/// one entry; iteration order is by command string.
pub type Batch = BTreeMap<RenderedCommand, Arc<Rule>>;

/// A fully resolved rule, ready to run.
///
/// Built once by [`crate::config::Service::build`] and never mutated
/// afterwards. Live processes belonging to a rule are tracked by the
/// lifecycle manager, not here.
#[derive(Clone)]
pub struct Rule {
    pub name: RuleName,
    /// `None` means the rule is only reachable as a continuation target.
    pub pattern: Option<Regex>,
    /// Command template; occurrences of `pattern` in it are replaced by the
    /// changed path.
    pub command: String,
    pub continuation: Option<RuleName>,
    /// Wait-mode (`true`) blocks until exit; background-mode is registered
    /// and replaced on rerun.
    pub wait: bool,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    /// Run through the platform shell instead of the lexer.
    pub shell: bool,
    pub dir: PathBuf,
    /// Fully composed environment, in order; later keys override earlier.
    pub env: Vec<(String, String)>,
    pub on_init: Option<String>,
    pub on_exit: Option<String>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("command", &self.command)
            .field("continuation", &self.continuation)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// Render the command template for `path`.
    ///
    /// Returns `None` when the rule has no pattern or the pattern does not
    /// match anywhere in `path`. Otherwise every occurrence of the pattern
    /// inside the template is replaced by `path`; `$n` and `${name}` in the
    /// path expand against the captures of each template occurrence. A
    /// template the pattern does not occur in is returned unchanged.
    pub fn render(&self, path: &str) -> Option<RenderedCommand> {
        let pattern = self.pattern.as_ref()?;
        if !pattern.is_match(path) {
            return None;
        }
        Some(pattern.replace_all(&self.command, path).into_owned())
    }
}

/// All rules of a service, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: BTreeMap<RuleName, Arc<Rule>>,
}

impl RuleTable {
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let rules = rules
            .into_iter()
            .map(|r| (r.name.clone(), Arc::new(r)))
            .collect();
        Self { rules }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

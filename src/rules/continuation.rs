// src/rules/continuation.rs

use std::collections::HashMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::{debug, error};

use crate::errors::WatchproxyError;
use crate::rules::rule::{Batch, RuleTable};
use crate::types::RuleName;

/// Walks `continue` links one batch at a time.
///
/// Every rule reached through a link remembers every rule that has led to
/// it, merged across all the links that reached it. A link back into that
/// lineage is a cycle: it is reported and the link is dropped, while the
/// other links of the same batch still resolve.
///
/// Continuation targets are keyed by their own command template verbatim;
/// they never see a matched path.
#[derive(Debug)]
pub struct ChainResolver<'a> {
    rules: &'a RuleTable,
    lineage: HashMap<RuleName, Vec<RuleName>>,
    errors: Vec<WatchproxyError>,
}

impl<'a> ChainResolver<'a> {
    pub fn new(rules: &'a RuleTable) -> Self {
        Self {
            rules,
            lineage: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Compute the batch that follows `batch`. An empty result ends the chain.
    pub fn next_batch(&mut self, batch: &Batch) -> Batch {
        let mut next = Batch::new();

        for rule in batch.values() {
            let Some(target_name) = rule.continuation.as_deref() else {
                continue;
            };

            let Some(target) = self.rules.get(target_name) else {
                let err = WatchproxyError::RuleNotFound(format!(
                    "'{}' continues to unknown rule '{}'",
                    rule.name, target_name
                ));
                error!(rule = %rule.name, error = %err, "dropping continuation");
                self.errors.push(err);
                continue;
            };

            let mut chain = self.lineage.get(&rule.name).cloned().unwrap_or_default();
            chain.push(rule.name.clone());

            if chain.iter().any(|name| name == target_name) {
                chain.push(target_name.to_string());
                let err = WatchproxyError::ContinuationCycle(chain.join(" -> "));
                error!(rule = %rule.name, error = %err, "dropping continuation");
                self.errors.push(err);
                continue;
            }

            let lineage = self.lineage.entry(target.name.clone()).or_default();
            for name in chain {
                if !lineage.contains(&name) {
                    lineage.push(name);
                }
            }

            if let Entry::Vacant(slot) = next.entry(target.command.clone()) {
                debug!(from = %rule.name, to = %target.name, "scheduling continuation");
                slot.insert(Arc::clone(target));
            }
        }

        next
    }

    /// Errors reported so far (unknown targets and cycles).
    pub fn errors(&self) -> &[WatchproxyError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<WatchproxyError> {
        self.errors
    }
}

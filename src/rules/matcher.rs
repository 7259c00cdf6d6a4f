// src/rules/matcher.rs

use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::debug;

use crate::rules::rule::{Batch, RuleTable};

/// Match `path` against every rule with a pattern and insert the rendered
/// commands into `into`.
///
/// An already present rendered command is left alone (first match wins),
/// so calling this repeatedly for the same path is idempotent. Returns the
/// number of new entries.
pub fn match_path(path: &str, rules: &RuleTable, into: &mut Batch) -> usize {
    let mut inserted = 0;

    for rule in rules.iter() {
        let Some(rendered) = rule.render(path) else {
            continue;
        };

        if let Entry::Vacant(slot) = into.entry(rendered) {
            debug!(rule = %rule.name, cmd = %slot.key(), path, "matched rule");
            slot.insert(Arc::clone(rule));
            inserted += 1;
        }
    }

    inserted
}

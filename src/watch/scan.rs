// src/watch/scan.rs

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::rules::{Batch, RuleTable, match_path};

/// Match every file under `root` once, as if each had just changed.
///
/// Used at startup so the first build happens without waiting for an edit.
/// Unreadable entries are logged and skipped.
pub fn scan_tree(root: &Path, rules: &RuleTable) -> Batch {
    let mut batch = Batch::new();
    let mut files = 0usize;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("initial scan: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        files += 1;
        match_path(&entry.path().to_string_lossy(), rules, &mut batch);
    }

    debug!(files, commands = batch.len(), "initial scan finished");
    batch
}

//! Dry-run unified diff support for `stratum diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use stratum_core::region;

use crate::engine::{Engine, SourceOptions};
use crate::error::{io_err, ReconcileError};
use crate::source::TemplateFetcher;

/// A single file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Compare what `update` would write with the working tree. Writes nothing.
pub fn diff_update<F: TemplateFetcher>(
    engine: &Engine<F>,
    root: &Path,
    opts: &SourceOptions,
) -> Result<Vec<FileDiff>, ReconcileError> {
    let plan = engine.plan_update(root, opts)?;

    let mut diffs = Vec::new();
    for (rel, staged) in plan.staged.files() {
        let existing = read_existing(&root.join(rel))?;
        if existing.is_some() && region::is_editable(rel) {
            continue;
        }
        if existing.as_deref() == Some(staged.as_slice()) {
            continue;
        }
        diffs.push(file_diff(rel, existing.as_deref().unwrap_or_default(), staged));
    }

    for (key, _) in &plan.orphans {
        let rel = PathBuf::from(key);
        if let Some(existing) = read_existing(&root.join(&rel))? {
            diffs.push(file_diff(&rel, &existing, &[]));
        }
    }
    Ok(diffs)
}

fn file_diff(rel: &Path, old: &[u8], new: &[u8]) -> FileDiff {
    let key = region::path_key(rel);
    let unified_diff = match (std::str::from_utf8(old), std::str::from_utf8(new)) {
        (Ok(old), Ok(new)) => {
            let old_header = format!("a/{key}");
            let new_header = format!("b/{key}");
            TextDiff::from_lines(old, new)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string()
        }
        _ => format!("Binary files a/{key} and b/{key} differ\n"),
    };
    FileDiff {
        path: rel.to_path_buf(),
        unified_diff,
    }
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, ReconcileError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

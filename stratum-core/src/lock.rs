//! Lock state store.
//!
//! # Storage layout
//!
//! ```text
//! <project>/
//!   .stratum.lock       (YAML LockRecord, committed with the project)
//!   .stratum.lock.tmp   (transient; only exists mid-save or after a crash)
//! ```
//!
//! Saves are atomic: serialize → `.tmp` sibling → `rename`. The `.tmp` file
//! is always in the same directory as the target, so the rename never
//! crosses filesystems.

use std::path::{Path, PathBuf};

use crate::error::{io_err, LockError};
use crate::types::LockRecord;

/// Lock file name, relative to the project root.
pub const LOCK_FILE: &str = ".stratum.lock";

/// `<root>/.stratum.lock` — pure, no I/O.
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

fn tmp_path(root: &Path) -> PathBuf {
    root.join(format!("{LOCK_FILE}.tmp"))
}

/// `true` if a lock record exists under `root`.
pub fn exists(root: &Path) -> bool {
    lock_path(root).is_file()
}

/// Load the lock record from `<root>/.stratum.lock`.
///
/// Returns `LockError::NotFound` if absent,
/// `LockError::Parse` (with path + line context) if malformed.
pub fn load_at(root: &Path) -> Result<LockRecord, LockError> {
    let path = lock_path(root);
    if !path.exists() {
        return Err(LockError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| LockError::Parse { path, source })
}

/// Atomically save `record` to `<root>/.stratum.lock`.
pub fn save_at(root: &Path, record: &LockRecord) -> Result<(), LockError> {
    let path = lock_path(root);
    let tmp = tmp_path(root);

    let yaml = serde_yaml::to_string(record)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

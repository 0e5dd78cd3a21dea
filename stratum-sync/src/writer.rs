//! Hash-gated atomic writer.
//!
//! ## `atomic_write` protocol
//!
//! 1. Content is fully staged (rendered, migrated, consolidated) by the caller.
//! 2. Editable-region files that already exist are preserved untouched.
//! 3. SHA-256 the staged content and the on-disk content → skip if identical.
//! 4. Write to `<path>.stratum.tmp`.
//! 5. Rename to the final path (atomic on POSIX).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use stratum_core::region;

use crate::error::{io_err, ReconcileError};
use crate::staged::Staged;

/// Outcome of an individual file write, with the project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WriteResult {
    /// Content changed or the file did not previously exist.
    Written { path: PathBuf },
    /// On-disk content already matches.
    Unchanged { path: PathBuf },
    /// `--dry-run`: the file *would* have been written.
    WouldWrite { path: PathBuf },
    /// Existing editable-region file, or a modified file the template dropped.
    Preserved { path: PathBuf },
    /// Managed file the template no longer produces, removed unmodified.
    Removed { path: PathBuf },
    /// `--dry-run`: the file *would* have been removed.
    WouldRemove { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path }
            | WriteResult::Preserved { path }
            | WriteResult::Removed { path }
            | WriteResult::WouldRemove { path } => path,
        }
    }

    /// `true` when the filesystem was (or would be) modified.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            WriteResult::Written { .. }
                | WriteResult::WouldWrite { .. }
                | WriteResult::Removed { .. }
                | WriteResult::WouldRemove { .. }
        )
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.stratum.tmp", path.display()))
}

/// Atomically write one staged file under `root`.
pub(crate) fn atomic_write(
    root: &Path,
    rel: &Path,
    content: &[u8],
    dry_run: bool,
) -> Result<WriteResult, ReconcileError> {
    let path = root.join(rel);
    let tmp = tmp_path_for(&path);
    atomic_write_with_tmp(&path, rel, content, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    rel: &Path,
    content: &[u8],
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, ReconcileError> {
    let result_path = rel.to_path_buf();

    let existing = match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(path, e)),
    };

    if let Some(existing) = &existing {
        if region::is_editable(rel) {
            tracing::debug!("preserved (editable): {}", rel.display());
            return Ok(WriteResult::Preserved { path: result_path });
        }
        if content_hash(existing) == content_hash(content) {
            tracing::debug!("unchanged: {}", rel.display());
            return Ok(WriteResult::Unchanged { path: result_path });
        }
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", rel.display());
        return Ok(WriteResult::WouldWrite { path: result_path });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", rel.display());
    Ok(WriteResult::Written { path: result_path })
}

/// Write every staged file, in path order.
pub fn write_staged(staged: &Staged, dry_run: bool) -> Result<Vec<WriteResult>, ReconcileError> {
    staged
        .files()
        .iter()
        .map(|(rel, content)| atomic_write(staged.root(), rel, content, dry_run))
        .collect()
}

/// Remove managed files the template stopped producing, if they still carry
/// the content stratum last wrote. `orphans` pairs a path key with its
/// recorded hash.
pub fn remove_orphans(
    root: &Path,
    orphans: &[(String, String)],
    dry_run: bool,
) -> Result<Vec<WriteResult>, ReconcileError> {
    let mut results = Vec::new();
    for (key, recorded) in orphans {
        let rel = PathBuf::from(key);
        let path = root.join(&rel);
        let current = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(io_err(&path, e)),
        };
        if &content_hash(&current) != recorded {
            tracing::warn!(
                "{key} is no longer produced by the template but was modified; keeping it"
            );
            results.push(WriteResult::Preserved { path: rel });
            continue;
        }
        if dry_run {
            tracing::info!("[dry-run] would remove: {key}");
            results.push(WriteResult::WouldRemove { path: rel });
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        tracing::info!("removed: {key}");
        results.push(WriteResult::Removed { path: rel });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> WriteResult {
        atomic_write(root, Path::new(rel), content.as_bytes(), false).unwrap()
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let result = write(tmp.path(), "pyproject.toml", "hello");
        assert!(matches!(result, WriteResult::Written { .. }));
        assert!(tmp.path().join("pyproject.toml").exists());
    }

    #[test]
    fn second_write_same_content_returns_unchanged() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "file.md", "same content");
        let result = write(tmp.path(), "file.md", "same content");
        assert!(matches!(result, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn changed_content_returns_written() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "file.md", "v1");
        let result = write(tmp.path(), "file.md", "v2");
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(fs::read_to_string(tmp.path().join("file.md")).unwrap(), "v2");
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().unwrap();
        let result = atomic_write(tmp.path(), Path::new("nope.md"), b"content", true).unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!tmp.path().join("nope.md").exists(), "dry-run must not create files");
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "clean.md", "data");
        assert!(!tmp.path().join("clean.md.stratum.tmp").exists());
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), ".github/workflows/ci.yml", "name: ci\n");
        assert!(tmp.path().join(".github/workflows/ci.yml").exists());
    }

    #[test]
    fn existing_editable_file_is_preserved() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("apps/api")).unwrap();
        fs::write(tmp.path().join("apps/api/views.py"), "# mine\n").unwrap();

        let result = write(tmp.path(), "apps/api/views.py", "# template\n");
        assert!(matches!(result, WriteResult::Preserved { .. }));
        assert_eq!(fs::read_to_string(tmp.path().join("apps/api/views.py")).unwrap(), "# mine\n");

        let created = write(tmp.path(), "apps/api/urls.py", "# template\n");
        assert!(matches!(created, WriteResult::Written { .. }));
    }

    #[test]
    fn unchanged_write_keeps_mtime() {
        use filetime::{set_file_mtime, FileTime};

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "settings.yaml", "DEBUG: false\n");
        let path = tmp.path().join("settings.yaml");
        let old = FileTime::from_unix_time(1_600_000_000, 0);
        set_file_mtime(&path, old).unwrap();

        write(tmp.path(), "settings.yaml", "DEBUG: false\n");
        let after = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert_eq!(after, old, "unchanged content must not be rewritten");
    }

    #[test]
    fn orphans_removed_only_when_unmodified() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("old.cfg"), "x").unwrap();
        fs::write(tmp.path().join("edited.cfg"), "changed").unwrap();
        let orphans = vec![
            ("old.cfg".to_string(), content_hash(b"x")),
            ("edited.cfg".to_string(), content_hash(b"original")),
            ("gone.cfg".to_string(), content_hash(b"y")),
        ];

        let dry = remove_orphans(tmp.path(), &orphans, true).unwrap();
        assert!(matches!(dry[0], WriteResult::WouldRemove { .. }));
        assert!(tmp.path().join("old.cfg").exists());

        let results = remove_orphans(tmp.path(), &orphans, false).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], WriteResult::Removed { .. }));
        assert!(matches!(results[1], WriteResult::Preserved { .. }));
        assert!(!tmp.path().join("old.cfg").exists());
        assert!(tmp.path().join("edited.cfg").exists());
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("file.md");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("file.md.stratum.tmp");

        let result = atomic_write_with_tmp(
            &path,
            Path::new("readonly/file.md"),
            b"new content",
            false,
            &tmp_path,
        );

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        }
        assert!(!tmp_path.exists(), ".stratum.tmp should be cleaned up");
    }
}

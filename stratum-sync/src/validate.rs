//! Drift detection for framework-owned files.
//!
//! Compares every file recorded in the lock record's `files` map against the
//! working tree. When `.protected_files.yaml` exists, only the paths it lists
//! (exact files or directory prefixes) are reported.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use stratum_core::lock;

use crate::error::{io_err, ReconcileError};
use crate::writer::content_hash;

pub const PROTECTED_FILES: &str = ".protected_files.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfractionKind {
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Infraction {
    pub path: String,
    pub kind: InfractionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Number of recorded files that were compared.
    pub checked: usize,
    pub infractions: Vec<Infraction>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.infractions.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProtectedFiles {
    #[serde(default)]
    protected_files: Vec<String>,
}

fn load_protected(root: &Path) -> Result<Option<Vec<String>>, ReconcileError> {
    let path = root.join(PROTECTED_FILES);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&path, e)),
    };
    let parsed: Option<ProtectedFiles> =
        serde_yaml::from_str(&text).map_err(|e| ReconcileError::ArtifactInvalid {
            path: path.clone(),
            format: "YAML",
            reason: e.to_string(),
        })?;
    Ok(Some(parsed.unwrap_or_default().protected_files))
}

fn is_protected(key: &str, protected: &[String]) -> bool {
    protected.iter().any(|entry| {
        let entry = entry.trim_start_matches("./").trim_end_matches('/');
        key == entry || key.strip_prefix(entry).is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Check recorded framework files against disk.
pub fn validate(root: &Path) -> Result<ValidationReport, ReconcileError> {
    let record = lock::load_at(root)?;
    let protected = load_protected(root)?;

    let mut report = ValidationReport::default();
    for (key, expected) in &record.files {
        if let Some(list) = &protected {
            if !is_protected(key, list) {
                continue;
            }
        }
        report.checked += 1;
        let path = root.join(key);
        let kind = match std::fs::read(&path) {
            Ok(bytes) if &content_hash(&bytes) == expected => continue,
            Ok(_) => InfractionKind::Modified,
            Err(e) if e.kind() == ErrorKind::NotFound => InfractionKind::Deleted,
            Err(e) => return Err(io_err(&path, e)),
        };
        tracing::debug!("{key}: {kind:?}");
        report.infractions.push(Infraction {
            path: key.clone(),
            kind,
        });
    }
    Ok(report)
}

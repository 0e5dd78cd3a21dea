//! Editable / non-editable region boundary.
//!
//! The boundary is a pure predicate over project-relative paths. Anything
//! under `apps/` or `services/` belongs to developers; everything else is
//! owned by the framework and regenerated on every update.

use std::path::{Component, Path, PathBuf};

use crate::types::ServiceName;

/// Directory that holds every bootstrapped service.
pub const APPS_DIR: &str = "apps";

/// Top-level directories owned by developers.
pub const EDITABLE_ROOTS: &[&str] = &[APPS_DIR, "services"];

/// Per-service metadata fragment file name.
pub const FRAGMENT_FILE: &str = "service.yaml";

/// `true` if `rel` lies inside the developer-owned region.
///
/// Leading `./` components are ignored. Absolute paths and paths that escape
/// the project root (`..`) are never editable.
pub fn is_editable(rel: &Path) -> bool {
    let first = rel
        .components()
        .find(|c| !matches!(c, Component::CurDir));
    match first {
        Some(Component::Normal(name)) => EDITABLE_ROOTS
            .iter()
            .any(|root| name == std::ffi::OsStr::new(root)),
        _ => false,
    }
}

/// `apps/<service>` — pure, no I/O.
pub fn service_dir(name: &ServiceName) -> PathBuf {
    Path::new(APPS_DIR).join(name.as_str())
}

/// `apps/<service>/service.yaml` — pure, no I/O.
pub fn fragment_path(name: &ServiceName) -> PathBuf {
    service_dir(name).join(FRAGMENT_FILE)
}

/// Stable string key for a relative path (forward slashes on every platform).
pub fn path_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

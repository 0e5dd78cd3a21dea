//! Error types for stratum-sync.

use std::path::PathBuf;

use thiserror::Error;

use stratum_core::{LockError, NameError};
use stratum_renderer::RenderError;

/// All errors that can arise from reconciliation.
///
/// Every variant is raised before the first file is written, except [`Io`]
/// which may also come from the writer itself.
///
/// [`Io`]: ReconcileError::Io
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("template source not found: {reason}")]
    TemplateSourceNotFound { reason: String },

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("{} is already a stratum project (found {marker})", .path.display())]
    AlreadyInitialized { path: PathBuf, marker: String },

    #[error("{} is not a stratum project; run `stratum init` first", .path.display())]
    NotInitialized { path: PathBuf },

    #[error("service '{name}' already exists: {reason}")]
    ServiceAlreadyExists { name: String, reason: String },

    #[error(
        "conflicting values for '{key}' in {artifact} declared by services {}",
        .services.join(", ")
    )]
    ConsolidationConflict {
        artifact: String,
        key: String,
        services: Vec<String>,
    },

    #[error("lock record is corrupt: {0}")]
    LockStoreCorrupt(#[source] LockError),

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("invalid service fragment {}: {reason}", .path.display())]
    FragmentInvalid { path: PathBuf, reason: String },

    #[error("cannot read {} as {format}: {reason}", .path.display())]
    ArtifactInvalid {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    #[error("post action '{id}' failed: {reason}")]
    PostActionFailed { id: String, reason: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<LockError> for ReconcileError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound { path } => ReconcileError::NotInitialized {
                path: path.parent().map(PathBuf::from).unwrap_or(path),
            },
            LockError::Io { path, source } => ReconcileError::Io { path, source },
            other => ReconcileError::LockStoreCorrupt(other),
        }
    }
}

/// Stable classification of a [`ReconcileError`], used for exit codes and
/// machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TemplateSourceNotFound,
    Render,
    AlreadyInitialized,
    NotInitialized,
    ServiceAlreadyExists,
    ConsolidationConflict,
    LockStoreCorrupt,
    InvalidName,
    FragmentInvalid,
    ArtifactInvalid,
    PostActionFailed,
    Io,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::TemplateSourceNotFound => "template_source_not_found",
            ErrorKind::Render => "render",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::ServiceAlreadyExists => "service_already_exists",
            ErrorKind::ConsolidationConflict => "consolidation_conflict",
            ErrorKind::LockStoreCorrupt => "lock_store_corrupt",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::FragmentInvalid => "fragment_invalid",
            ErrorKind::ArtifactInvalid => "artifact_invalid",
            ErrorKind::PostActionFailed => "post_action_failed",
            ErrorKind::Io => "io",
        }
    }

    /// Process exit code. `1` is left to unclassified failures.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::TemplateSourceNotFound => 10,
            ErrorKind::Render => 11,
            ErrorKind::AlreadyInitialized => 12,
            ErrorKind::NotInitialized => 13,
            ErrorKind::ServiceAlreadyExists => 14,
            ErrorKind::ConsolidationConflict => 15,
            ErrorKind::LockStoreCorrupt => 16,
            ErrorKind::InvalidName => 17,
            ErrorKind::FragmentInvalid => 18,
            ErrorKind::ArtifactInvalid => 19,
            ErrorKind::PostActionFailed => 20,
            ErrorKind::Io => 21,
        }
    }
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::TemplateSourceNotFound { .. } => ErrorKind::TemplateSourceNotFound,
            ReconcileError::Render(_) => ErrorKind::Render,
            ReconcileError::AlreadyInitialized { .. } => ErrorKind::AlreadyInitialized,
            ReconcileError::NotInitialized { .. } => ErrorKind::NotInitialized,
            ReconcileError::ServiceAlreadyExists { .. } => ErrorKind::ServiceAlreadyExists,
            ReconcileError::ConsolidationConflict { .. } => ErrorKind::ConsolidationConflict,
            ReconcileError::LockStoreCorrupt(_) => ErrorKind::LockStoreCorrupt,
            ReconcileError::InvalidName(_) => ErrorKind::InvalidName,
            ReconcileError::FragmentInvalid { .. } => ErrorKind::FragmentInvalid,
            ReconcileError::ArtifactInvalid { .. } => ErrorKind::ArtifactInvalid,
            ReconcileError::PostActionFailed { .. } => ErrorKind::PostActionFailed,
            ReconcileError::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}

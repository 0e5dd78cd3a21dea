//! Error types for stratum-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from lock store operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse lock record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The lock file did not exist at the expected path.
    #[error("lock record not found at {path}")]
    NotFound { path: PathBuf },
}

/// A project or service name that cannot be used as a Python package.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid name '{name}': {reason}")]
pub struct NameError {
    pub name: String,
    pub reason: &'static str,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}

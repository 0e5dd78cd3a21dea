//! Error types for stratum-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from template rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera failed to parse or render a template file.
    #[error("template '{template}' failed to render: {source}")]
    Tera {
        template: String,
        #[source]
        source: tera::Error,
    },

    /// The render context could not be turned into a Tera context.
    #[error("cannot build render context: {0}")]
    Context(#[source] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while reading the template directory.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template directory does not exist or is not a directory.
    #[error("template directory not found: {path}")]
    MissingTemplateDir { path: PathBuf },

    /// A templated path component rendered to something that is not a plain name.
    #[error("template path '{template}' rendered to invalid component '{rendered}'")]
    InvalidPath { template: String, rendered: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

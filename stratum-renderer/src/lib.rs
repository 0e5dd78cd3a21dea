//! # stratum-renderer
//!
//! Tera-based adapter that renders project and service template directories
//! into in-memory trees.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stratum_renderer::{RenderContext, TemplateRenderer};
//!
//! fn preview(template_dir: &Path) {
//!     let project = "demo".parse().expect("valid name");
//!     let ctx = RenderContext::for_project(&project, &[], 1);
//!     if let Ok(tree) = TemplateRenderer::new().render_tree(template_dir, &ctx) {
//!         for (path, bytes) in tree {
//!             println!("{}: {} bytes", path.display(), bytes.len());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::RenderContext;
pub use engine::{RenderResult, RenderedTree, TemplateRenderer};
pub use error::RenderError;

//! # stratum-sync
//!
//! Template resolution, fragment consolidation, post actions, the hash-gated
//! atomic writer, and the reconciliation engine that drives them.
//!
//! Call [`Engine::init`], [`Engine::add_service`] or [`Engine::update`] on a
//! project root. [`validate::validate`] and [`diff::diff_update`] are
//! read-only companions.

pub mod consolidate;
pub mod diff;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod post_actions;
pub mod source;
pub mod staged;
pub mod validate;
pub mod writer;

pub use engine::{Engine, InitOptions, Outcome, SourceOptions, UpdateOptions, UpdatePlan};
pub use error::{ErrorKind, ReconcileError};
pub use source::{FetchError, GitCliFetcher, TemplateFetcher, TEMPLATE_ENV};
pub use writer::WriteResult;

//! Stratum core library — domain types, region boundary, lock state store.
//!
//! - [`types`] — names, [`LockRecord`] and its parts
//! - [`region`] — editable / non-editable path predicate
//! - [`lock`] — atomic load / save of `.stratum.lock`
//! - [`error`] — [`LockError`], [`NameError`]

pub mod error;
pub mod lock;
pub mod region;
pub mod types;

pub use error::{LockError, NameError};
pub use types::{
    LockRecord, ProjectName, ServiceName, ServiceRecord, TemplateOrigin, DEFAULT_SERVICE,
};

//! Domain types for a stratum-managed project.
//!
//! All types are serializable/deserializable via serde + serde_yaml. Names are
//! validated on construction *and* on deserialization, so a [`LockRecord`]
//! loaded from disk never carries a name that could escape `apps/`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NameError;

/// Current on-disk schema of the lock record.
pub const LOCK_SCHEMA: u32 = 1;

/// Service created by `init` when none are requested.
pub const DEFAULT_SERVICE: &str = "api";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Names that would shadow the layout itself.
const RESERVED: &[&str] = &["apps", "services", "templates", "test", "tests"];

fn validate_identifier(name: &str) -> Result<(), NameError> {
    let err = |reason| NameError {
        name: name.to_owned(),
        reason,
    };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(err("name must not be empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(err("name must start with a letter or underscore"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(err("only ASCII letters, digits and underscores are allowed"));
    }
    Ok(())
}

/// A strongly-typed project name (the root Python package).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectName(String);

impl ProjectName {
    /// Derive a project name from a directory name: `my-service` → `my_service`.
    pub fn from_dir_name(dir_name: &str) -> Result<Self, NameError> {
        dir_name.replace('-', "_").parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProjectName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_identifier(s)?;
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for ProjectName {
    type Error = NameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_identifier(&s)?;
        Ok(Self(s))
    }
}

impl From<ProjectName> for String {
    fn from(name: ProjectName) -> Self {
        name.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A strongly-typed service (Django app) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dotted module path Django uses for this service.
    pub fn module_path(&self) -> String {
        format!("apps.{}", self.0)
    }
}

impl FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_identifier(s)?;
        if RESERVED.contains(&s) {
            return Err(NameError {
                name: s.to_owned(),
                reason: "name is reserved by the project layout",
            });
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for ServiceName {
    type Error = NameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Lock record
// ---------------------------------------------------------------------------

/// Where the templates came from on the last successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOrigin {
    /// Local path or normalised remote URL.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_ref: Option<String>,
    /// Template manifest version.
    #[serde(default = "default_template_version")]
    pub version: u32,
}

fn default_template_version() -> u32 {
    1
}

fn default_schema() -> u32 {
    LOCK_SCHEMA
}

/// A service bootstrapped into the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: ServiceName,
    pub bootstrapped_at: DateTime<Utc>,
}

/// Persisted state of a stratum project (`.stratum.lock`).
///
/// Unknown fields are ignored on read so older binaries can open records
/// written by newer ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(default = "default_schema")]
    pub schema: u32,
    pub project: ProjectName,
    pub template: TemplateOrigin,
    pub created_at: DateTime<Utc>,
    pub last_run: DateTime<Utc>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    /// Post actions already applied, by id.
    #[serde(default)]
    pub applied_actions: Vec<String>,
    /// Extra render data given at init, replayed on every later render.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    /// Relative path → SHA-256 of the content last written by stratum.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl LockRecord {
    /// A fresh record with every service bootstrapped at `now`.
    pub fn new(
        project: ProjectName,
        template: TemplateOrigin,
        services: &[ServiceName],
        now: DateTime<Utc>,
    ) -> Self {
        LockRecord {
            schema: LOCK_SCHEMA,
            project,
            template,
            created_at: now,
            last_run: now,
            services: services
                .iter()
                .map(|name| ServiceRecord {
                    name: name.clone(),
                    bootstrapped_at: now,
                })
                .collect(),
            applied_actions: Vec::new(),
            data: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn has_service(&self, name: &ServiceName) -> bool {
        self.services.iter().any(|s| &s.name == name)
    }

    /// Append a service record; returns `false` if the name was already present.
    pub fn push_service(&mut self, name: ServiceName, at: DateTime<Utc>) -> bool {
        if self.has_service(&name) {
            return false;
        }
        self.services.push(ServiceRecord {
            name,
            bootstrapped_at: at,
        });
        true
    }

    pub fn service_names(&self) -> Vec<ServiceName> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn has_applied(&self, action_id: &str) -> bool {
        self.applied_actions.iter().any(|id| id == action_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

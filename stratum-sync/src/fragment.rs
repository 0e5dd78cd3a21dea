//! Per-service metadata fragments (`apps/<service>/service.yaml`).
//!
//! A fragment is a YAML mapping keyed by category. Each category value is a
//! mapping that gets merged into one root artifact:
//!
//! ```yaml
//! project:
//!   dependencies: ["celery>=5"]
//! lint:
//!   extend-select: ["DJ"]
//! settings:
//!   CELERY_BROKER_URL: "redis://localhost:6379/0"
//! docs:
//!   summary: Background job runner.
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use stratum_core::{region, ServiceName};

use crate::error::ReconcileError;
use crate::staged::Staged;

/// Recognised fragment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Project,
    Lint,
    Ci,
    PreCommit,
    Settings,
    Docs,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Project,
            Category::Lint,
            Category::Ci,
            Category::PreCommit,
            Category::Settings,
            Category::Docs,
        ]
    }

    pub fn key(self) -> &'static str {
        match self {
            Category::Project => "project",
            Category::Lint => "lint",
            Category::Ci => "ci",
            Category::PreCommit => "pre_commit",
            Category::Settings => "settings",
            Category::Docs => "docs",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Category::all().iter().copied().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A parsed fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub service: ServiceName,
    pub categories: BTreeMap<Category, Value>,
    /// Top-level keys that are not a known category.
    pub unknown: Vec<String>,
}

impl Fragment {
    pub fn empty(service: ServiceName) -> Self {
        Fragment {
            service,
            categories: BTreeMap::new(),
            unknown: Vec::new(),
        }
    }

    pub fn parse(service: ServiceName, text: &str) -> Result<Self, String> {
        let doc: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        let map = match doc {
            Value::Null => return Ok(Fragment::empty(service)),
            Value::Object(map) => map,
            other => return Err(format!("expected a mapping, found {}", type_name(&other))),
        };

        let mut fragment = Fragment::empty(service);
        for (key, value) in map {
            let Some(category) = Category::from_key(&key) else {
                fragment.unknown.push(key);
                continue;
            };
            match value {
                Value::Null => {}
                Value::Object(_) => {
                    fragment.categories.insert(category, value);
                }
                other => {
                    return Err(format!(
                        "category '{key}' must be a mapping, found {}",
                        type_name(&other)
                    ))
                }
            }
        }
        Ok(fragment)
    }

    pub fn get(&self, category: Category) -> Option<&Value> {
        self.categories.get(&category)
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Load a service's fragment through the staging tree; `None` if absent.
pub fn load(staged: &Staged, service: &ServiceName) -> Result<Option<Fragment>, ReconcileError> {
    let rel = region::fragment_path(service);
    let Some(text) = staged.read_string(&rel)? else {
        return Ok(None);
    };
    Fragment::parse(service.clone(), &text)
        .map(Some)
        .map_err(|reason| ReconcileError::FragmentInvalid { path: rel, reason })
}

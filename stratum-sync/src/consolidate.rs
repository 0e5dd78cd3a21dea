//! Merges per-service fragments into the framework-owned root artifacts.
//!
//! Two passes per artifact:
//!
//! 1. fragments merge with each other into an overlay; differing scalars
//!    from two services are a [`ReconcileError::ConsolidationConflict`];
//! 2. the overlay merges into the current artifact (staged render, else
//!    disk). Invariant keys keep the template value, other keys take the
//!    fragment value.
//!
//! Every format is merged as a [`serde_json::Value`] tree, so output is
//! deterministic. TOML changes are patched back into the original document
//! with `toml_edit`; YAML is re-serialized. Nothing is written here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, TableLike};

use stratum_core::ServiceName;

use crate::error::ReconcileError;
use crate::fragment::{self, Category, Fragment};
use crate::staged::Staged;

pub const README: &str = "README.md";
pub const DOCS_START: &str = "<!-- stratum:services:start -->";
pub const DOCS_END: &str = "<!-- stratum:services:end -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Toml,
    Yaml,
}

impl ArtifactFormat {
    fn label(self) -> &'static str {
        match self {
            ArtifactFormat::Toml => "TOML",
            ArtifactFormat::Yaml => "YAML",
        }
    }
}

/// Where a category lands and which of its keys belong to the template.
#[derive(Debug)]
struct Target {
    category: Category,
    artifact: &'static str,
    format: ArtifactFormat,
    mount: &'static [&'static str],
    invariant: &'static [&'static str],
}

const TARGETS: &[Target] = &[
    Target {
        category: Category::Project,
        artifact: "pyproject.toml",
        format: ArtifactFormat::Toml,
        mount: &["project"],
        invariant: &["name", "version", "requires-python", "scripts", "entry-points"],
    },
    Target {
        category: Category::Lint,
        artifact: "pyproject.toml",
        format: ArtifactFormat::Toml,
        mount: &["tool", "ruff"],
        invariant: &["target-version", "src"],
    },
    Target {
        category: Category::Ci,
        artifact: ".github/workflows/ci.yml",
        format: ArtifactFormat::Yaml,
        mount: &[],
        invariant: &["name", "on", "jobs.test"],
    },
    Target {
        category: Category::PreCommit,
        artifact: ".pre-commit-config.yaml",
        format: ArtifactFormat::Yaml,
        mount: &[],
        invariant: &["default_language_version", "minimum_pre_commit_version"],
    },
    Target {
        category: Category::Settings,
        artifact: "settings.yaml",
        format: ArtifactFormat::Yaml,
        mount: &[],
        invariant: &[
            "ROOT_URLCONF",
            "WSGI_APPLICATION",
            "ASGI_APPLICATION",
            "DEFAULT_AUTO_FIELD",
        ],
    },
];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// New contents for one root artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUpdate {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// An invariant key a fragment tried to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverriddenKey {
    pub artifact: String,
    pub key: String,
    pub kept: String,
    pub ignored: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownCategory {
    pub service: ServiceName,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consolidation {
    /// Only artifacts whose content actually changes.
    pub updates: Vec<ArtifactUpdate>,
    pub overridden: Vec<OverriddenKey>,
    pub unknown: Vec<UnknownCategory>,
    /// Number of services that had a fragment file.
    pub fragments: usize,
}

// ---------------------------------------------------------------------------
// consolidate
// ---------------------------------------------------------------------------

/// Consolidate the fragments of `services` against the artifacts visible
/// through `staged`.
pub fn consolidate(staged: &Staged, services: &[ServiceName]) -> Result<Consolidation, ReconcileError> {
    let mut out = Consolidation::default();
    let mut fragments = Vec::with_capacity(services.len());
    for service in services {
        match fragment::load(staged, service)? {
            Some(f) => {
                out.fragments += 1;
                fragments.push(f);
            }
            None => fragments.push(Fragment::empty(service.clone())),
        }
    }

    for f in &fragments {
        for category in &f.unknown {
            tracing::warn!("service '{}': ignoring unknown category '{category}'", f.service);
            out.unknown.push(UnknownCategory {
                service: f.service.clone(),
                category: category.clone(),
            });
        }
    }

    let mut artifacts: Vec<(&'static str, ArtifactFormat)> = Vec::new();
    for t in TARGETS {
        if !artifacts.iter().any(|(a, _)| *a == t.artifact) {
            artifacts.push((t.artifact, t.format));
        }
    }

    for (artifact, format) in artifacts {
        let rel = Path::new(artifact);
        let original = staged.read_string(rel)?;
        let mut doc = match &original {
            Some(text) => parse_artifact(format, rel, text)?,
            None => Value::Object(Map::new()),
        };
        let before = doc.clone();

        for target in TARGETS.iter().filter(|t| t.artifact == artifact) {
            let implicit_apps = target.category == Category::Settings
                && (original.is_some() || fragments.iter().any(|f| f.get(Category::Settings).is_some()));
            let overlay = merge_fragments(target, &fragments, implicit_apps)?;
            if overlay.as_object().map_or(true, Map::is_empty) {
                continue;
            }
            let slot = mount_mut(&mut doc, target, rel)?;
            let mut path = Vec::new();
            apply_overlay(slot, &overlay, &mut path, target, &mut out.overridden);
        }

        if doc == before {
            continue;
        }
        tracing::debug!("consolidated {artifact}");
        let contents = match format {
            ArtifactFormat::Toml => patch_toml(rel, original.as_deref(), &before, &doc)?,
            ArtifactFormat::Yaml => serialize_yaml(rel, &doc)?,
        };
        out.updates.push(ArtifactUpdate {
            path: rel.to_path_buf(),
            contents: contents.into_bytes(),
        });
    }

    if let Some(update) = consolidate_docs(staged, &fragments)? {
        out.updates.push(update);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Pass 1: fragment overlay
// ---------------------------------------------------------------------------

/// `implicit_apps` adds each service's `INSTALLED_APPS` entry; only set when
/// the settings artifact exists or a fragment declares settings.
fn merge_fragments(
    target: &Target,
    fragments: &[Fragment],
    implicit_apps: bool,
) -> Result<Value, ReconcileError> {
    let mut acc = Value::Object(Map::new());
    let mut owners = BTreeMap::new();
    for f in fragments {
        let service = f.service.as_str();
        if implicit_apps {
            let implicit = json!({ "INSTALLED_APPS": [f.service.module_path()] });
            merge_into(&mut acc, &implicit, &mut Vec::new(), service, &mut owners, target)?;
        }
        if let Some(value) = f.get(target.category) {
            merge_into(&mut acc, value, &mut Vec::new(), service, &mut owners, target)?;
        }
    }
    Ok(acc)
}

fn merge_into(
    acc: &mut Value,
    incoming: &Value,
    path: &mut Vec<String>,
    service: &str,
    owners: &mut BTreeMap<String, String>,
    target: &Target,
) -> Result<(), ReconcileError> {
    match (acc, incoming) {
        (Value::Object(a), Value::Object(i)) => {
            for (key, value) in i {
                path.push(key.clone());
                if let Some(existing) = a.get_mut(key) {
                    merge_into(existing, value, path, service, owners, target)?;
                } else {
                    owners.insert(path.join("."), service.to_owned());
                    a.insert(key.clone(), value.clone());
                }
                path.pop();
            }
            Ok(())
        }
        (Value::Array(a), Value::Array(i)) => {
            union_into(a, i);
            Ok(())
        }
        (a, i) if *a == *i => Ok(()),
        _ => {
            let mut services = vec![owner_of(owners, path), service.to_owned()];
            services.dedup();
            Err(ReconcileError::ConsolidationConflict {
                artifact: target.artifact.to_owned(),
                key: qualified_key(target, path),
                services,
            })
        }
    }
}

fn owner_of(owners: &BTreeMap<String, String>, path: &[String]) -> String {
    (1..=path.len())
        .rev()
        .find_map(|n| owners.get(&path[..n].join(".")))
        .cloned()
        .unwrap_or_else(|| "unknown".to_owned())
}

fn union_into(base: &mut Vec<Value>, incoming: &[Value]) {
    for item in incoming {
        if !base.contains(item) {
            base.push(item.clone());
        }
    }
}

fn qualified_key(target: &Target, path: &[String]) -> String {
    target
        .mount
        .iter()
        .map(|s| s.to_string())
        .chain(path.iter().cloned())
        .collect::<Vec<_>>()
        .join(".")
}

// ---------------------------------------------------------------------------
// Pass 2: overlay into artifact
// ---------------------------------------------------------------------------

fn is_invariant(key: &str, prefixes: &[&str]) -> bool {
    prefixes
        .iter()
        .any(|p| key == *p || key.strip_prefix(p).is_some_and(|rest| rest.starts_with('.')))
}

/// Merge `overlay` into `base`. Under an invariant key the template value is
/// kept whole: no added sub-keys, no extra sequence items.
fn apply_overlay(
    base: &mut Value,
    overlay: &Value,
    path: &mut Vec<String>,
    target: &Target,
    overridden: &mut Vec<OverriddenKey>,
) {
    if !path.is_empty() && is_invariant(&path.join("."), target.invariant) {
        let mut merged = base.clone();
        merge_plain(&mut merged, overlay);
        if merged != *base {
            let key = qualified_key(target, path);
            tracing::warn!(
                "{}: keeping template value for '{key}', ignoring fragment value {}",
                target.artifact,
                compact(overlay)
            );
            overridden.push(OverriddenKey {
                artifact: target.artifact.to_owned(),
                key,
                kept: compact(base),
                ignored: compact(overlay),
            });
        }
        return;
    }
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            for (key, value) in o {
                path.push(key.clone());
                if let Some(existing) = b.get_mut(key) {
                    apply_overlay(existing, value, path, target, overridden);
                } else {
                    b.insert(key.clone(), value.clone());
                }
                path.pop();
            }
        }
        (Value::Array(b), Value::Array(o)) => union_into(b, o),
        (b, o) => *b = o.clone(),
    }
}

fn merge_plain(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            for (key, value) in o {
                match b.get_mut(key) {
                    Some(existing) => merge_plain(existing, value),
                    None => {
                        b.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(b), Value::Array(o)) => union_into(b, o),
        (b, o) => *b = o.clone(),
    }
}

fn mount_mut<'a>(doc: &'a mut Value, target: &Target, rel: &Path) -> Result<&'a mut Value, ReconcileError> {
    let not_a_table = || ReconcileError::ArtifactInvalid {
        path: rel.to_path_buf(),
        format: target.format.label(),
        reason: format!("'{}' is not a table", target.mount.join(".")),
    };
    let mut slot = doc;
    for key in target.mount {
        let Value::Object(map) = slot else {
            return Err(not_a_table());
        };
        slot = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if slot.is_object() {
        Ok(slot)
    } else {
        Err(not_a_table())
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

fn parse_artifact(format: ArtifactFormat, rel: &Path, text: &str) -> Result<Value, ReconcileError> {
    let invalid = |reason: String| ReconcileError::ArtifactInvalid {
        path: rel.to_path_buf(),
        format: format.label(),
        reason,
    };
    let value: Value = match format {
        ArtifactFormat::Toml => toml::from_str(text).map_err(|e| invalid(e.to_string()))?,
        ArtifactFormat::Yaml => {
            if text.trim().is_empty() {
                Value::Null
            } else {
                serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?
            }
        }
    };
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(invalid(format!(
            "expected a mapping at the top level, found {}",
            fragment::type_name(&other)
        ))),
    }
}

fn serialize_yaml(rel: &Path, doc: &Value) -> Result<String, ReconcileError> {
    serde_yaml::to_string(doc).map_err(|e| ReconcileError::ArtifactInvalid {
        path: rel.to_path_buf(),
        format: ArtifactFormat::Yaml.label(),
        reason: e.to_string(),
    })
}

/// Apply the `before` → `after` changes to the original TOML text, keeping
/// its comments, key order and formatting for everything untouched.
fn patch_toml(
    rel: &Path,
    original: Option<&str>,
    before: &Value,
    after: &Value,
) -> Result<String, ReconcileError> {
    let mut doc = match original {
        Some(text) => text
            .parse::<DocumentMut>()
            .map_err(|e| ReconcileError::ArtifactInvalid {
                path: rel.to_path_buf(),
                format: ArtifactFormat::Toml.label(),
                reason: e.to_string(),
            })?,
        None => DocumentMut::new(),
    };
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    if let Some(after) = after.as_object() {
        patch_table(doc.as_table_mut(), before, after);
    }
    Ok(doc.to_string())
}

fn patch_table(table: &mut dyn TableLike, before: &Map<String, Value>, after: &Map<String, Value>) {
    for (key, new) in after {
        let old = before.get(key);
        if old == Some(new) {
            continue;
        }
        if let Some(item) = table.get_mut(key) {
            match (old, new) {
                (Some(Value::Object(old)), Value::Object(new)) => {
                    if let Some(child) = item.as_table_like_mut() {
                        patch_table(child, old, new);
                        continue;
                    }
                }
                (Some(Value::Array(old)), Value::Array(new)) if new.starts_with(old) => {
                    if let Some(array) = item.as_array_mut() {
                        for extra in &new[old.len()..] {
                            if let Some(value) = toml_value(extra) {
                                array.push(value);
                            }
                        }
                        continue;
                    }
                }
                _ => {}
            }
        }
        if let Some(item) = toml_item(new) {
            table.insert(key.as_str(), item);
        }
    }
}

fn toml_item(value: &Value) -> Option<Item> {
    match value {
        Value::Object(map) => {
            let mut table = Table::new();
            table.set_implicit(true);
            for (key, v) in map {
                if let Some(item) = toml_item(v) {
                    table.insert(key.as_str(), item);
                }
            }
            Some(Item::Table(table))
        }
        other => toml_value(other).map(Item::Value),
    }
}

fn toml_value(value: &Value) -> Option<toml_edit::Value> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => n.as_f64().map(Into::into),
        },
        Value::String(s) => Some(s.as_str().into()),
        Value::Array(items) => {
            let mut array = Array::new();
            for item in items.iter().filter_map(toml_value) {
                array.push(item);
            }
            Some(toml_edit::Value::Array(array))
        }
        Value::Object(map) => {
            let mut table = InlineTable::new();
            for (key, v) in map {
                if let Some(value) = toml_value(v) {
                    table.insert(key.as_str(), value);
                }
            }
            Some(toml_edit::Value::InlineTable(table))
        }
    }
}

// ---------------------------------------------------------------------------
// Docs block
// ---------------------------------------------------------------------------

fn consolidate_docs(staged: &Staged, fragments: &[Fragment]) -> Result<Option<ArtifactUpdate>, ReconcileError> {
    let rel = Path::new(README);
    let original = staged.read_string(rel)?;
    if fragments.is_empty() && original.is_none() {
        return Ok(None);
    }
    let current = original.unwrap_or_default();
    let spliced = splice_docs_block(&current, &render_docs_block(fragments));
    if spliced == current {
        return Ok(None);
    }
    Ok(Some(ArtifactUpdate {
        path: rel.to_path_buf(),
        contents: spliced.into_bytes(),
    }))
}

fn render_docs_block(fragments: &[Fragment]) -> String {
    let mut out = format!("{DOCS_START}\n## Services\n");
    for f in fragments {
        out.push_str(&format!("\n### {}\n", f.service));
        if let Some(Value::Object(map)) = f.get(Category::Docs) {
            if !map.is_empty() {
                out.push('\n');
            }
            for (key, value) in map {
                out.push_str(&format!("- **{key}**: {}\n", compact(value)));
            }
        }
    }
    out.push_str(DOCS_END);
    out
}

/// Replace the managed block in `readme`, or append one.
pub fn splice_docs_block(readme: &str, block: &str) -> String {
    if let Some(start) = readme.find(DOCS_START) {
        if let Some(end_rel) = readme[start..].find(DOCS_END) {
            let end = start + end_rel + DOCS_END.len();
            return format!("{}{}{}", &readme[..start], block, &readme[end..]);
        }
    }
    let mut out = readme.to_owned();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(block);
    out.push('\n');
    out
}

//! Versioned, idempotent migration steps run during `update`.
//!
//! Each action is gated on the template manifest version and recorded in
//! `applied_actions` once it has run, so it never runs twice for a project.
//! Actions only stage changes; the writer decides what reaches disk.

use std::path::{Path, PathBuf};

use serde::Serialize;

use stratum_core::{region, ServiceName};

use crate::error::{io_err, ReconcileError};
use crate::staged::Staged;

/// What an action changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub created: Vec<PathBuf>,
    pub adopted: Vec<ServiceName>,
}

/// Mutable view handed to each action.
#[derive(Debug)]
pub struct ActionContext<'a> {
    pub staged: &'a mut Staged,
    /// Services known so far, including ones adopted by earlier actions.
    pub services: Vec<ServiceName>,
}

pub type ActionFn = fn(&mut ActionContext<'_>) -> Result<ActionOutcome, String>;

#[derive(Clone, Copy)]
pub struct PostAction {
    pub id: &'static str,
    pub version: u32,
    pub description: &'static str,
    pub apply: ActionFn,
}

/// An action that ran, with what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedAction {
    pub id: String,
    pub outcome: ActionOutcome,
}

/// Built-in actions, sorted by `(version, id)`.
pub const REGISTRY: &[PostAction] = &[
    PostAction {
        id: "v1/apps-package",
        version: 1,
        description: "ensure apps/__init__.py exists",
        apply: apps_package,
    },
    PostAction {
        id: "v2/service-fragments",
        version: 2,
        description: "ensure every service has a service.yaml fragment",
        apply: service_fragments,
    },
    PostAction {
        id: "v2/service-packages",
        version: 2,
        description: "ensure every service is a Python package",
        apply: service_packages,
    },
    PostAction {
        id: "v3/adopt-services",
        version: 3,
        description: "register apps/* packages missing from the lock record",
        apply: adopt_services,
    },
];

const FRAGMENT_STUB: &str = "\
# Settings this service contributes to the project root.
# Categories: project, lint, ci, pre_commit, settings, docs.
";

/// Actions eligible for `template_version` and not yet in `applied`.
pub fn pending<'a>(
    registry: &'a [PostAction],
    template_version: u32,
    applied: &[String],
) -> Vec<&'a PostAction> {
    let mut out: Vec<&PostAction> = registry
        .iter()
        .filter(|a| a.version <= template_version && !applied.iter().any(|id| id == a.id))
        .collect();
    out.sort_by(|a, b| (a.version, a.id).cmp(&(b.version, b.id)));
    out
}

/// Run every pending action in order. Stops at the first failure.
pub fn run(
    registry: &[PostAction],
    template_version: u32,
    applied: &[String],
    ctx: &mut ActionContext<'_>,
) -> Result<Vec<AppliedAction>, ReconcileError> {
    let mut ran = Vec::new();
    for action in pending(registry, template_version, applied) {
        tracing::debug!("post action {}: {}", action.id, action.description);
        let outcome = (action.apply)(ctx).map_err(|reason| ReconcileError::PostActionFailed {
            id: action.id.to_owned(),
            reason,
        })?;
        for name in &outcome.adopted {
            if !ctx.services.contains(name) {
                ctx.services.push(name.clone());
            }
        }
        if !outcome.created.is_empty() || !outcome.adopted.is_empty() {
            tracing::info!(
                "post action {}: {} created, {} adopted",
                action.id,
                outcome.created.len(),
                outcome.adopted.len()
            );
        }
        ran.push(AppliedAction {
            id: action.id.to_owned(),
            outcome,
        });
    }
    Ok(ran)
}

/// Every id in the registry up to `template_version`.
pub fn ids_up_to(registry: &[PostAction], template_version: u32) -> Vec<String> {
    pending(registry, template_version, &[])
        .into_iter()
        .map(|a| a.id.to_owned())
        .collect()
}

// ---------------------------------------------------------------------------
// Built-in actions
// ---------------------------------------------------------------------------

fn ensure_file(staged: &mut Staged, rel: PathBuf, contents: &str, created: &mut Vec<PathBuf>) {
    if !staged.exists(&rel) {
        staged.stage(rel.clone(), contents);
        created.push(rel);
    }
}

pub(crate) fn ensure_apps_package(staged: &mut Staged) -> Vec<PathBuf> {
    let mut created = Vec::new();
    ensure_file(staged, Path::new(region::APPS_DIR).join("__init__.py"), "", &mut created);
    created
}

fn apps_package(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, String> {
    Ok(ActionOutcome {
        created: ensure_apps_package(ctx.staged),
        adopted: Vec::new(),
    })
}

fn service_packages(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, String> {
    let mut outcome = ActionOutcome::default();
    for service in &ctx.services {
        let rel = region::service_dir(service).join("__init__.py");
        ensure_file(ctx.staged, rel, "", &mut outcome.created);
    }
    Ok(outcome)
}

fn service_fragments(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, String> {
    let mut outcome = ActionOutcome::default();
    for service in &ctx.services {
        ensure_file(ctx.staged, region::fragment_path(service), FRAGMENT_STUB, &mut outcome.created);
    }
    Ok(outcome)
}

fn adopt_services(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, String> {
    let apps = ctx.staged.root().join(region::APPS_DIR);
    let mut outcome = ActionOutcome::default();
    if !apps.is_dir() {
        return Ok(outcome);
    }
    let mut entries = std::fs::read_dir(&apps)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| io_err(&apps, e).to_string())?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if !entry.path().join("apps.py").is_file() {
            continue;
        }
        let raw = entry.file_name().to_string_lossy().into_owned();
        match raw.parse::<ServiceName>() {
            Ok(name) if !ctx.services.contains(&name) => outcome.adopted.push(name),
            Ok(_) => {}
            Err(e) => tracing::warn!("not adopting apps/{raw}: {e}"),
        }
    }
    Ok(outcome)
}

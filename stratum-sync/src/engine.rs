//! Reconciliation engine: `init`, `add_service` and `update`.
//!
//! Every operation follows the same shape:
//!
//! 1. preflight checks against the lock record and the project directory;
//! 2. resolve and materialise the template source;
//! 3. render into a [`Staged`] tree, run post actions, consolidate;
//! 4. hand the staged tree to the writer;
//! 5. save the lock record, last.
//!
//! Any error before step 4 leaves the project exactly as it was.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use stratum_core::{
    lock, region, LockRecord, ProjectName, ServiceName, TemplateOrigin, DEFAULT_SERVICE,
};
use stratum_renderer::{RenderContext, TemplateRenderer};

use crate::consolidate::{self, Consolidation, OverriddenKey, UnknownCategory};
use crate::error::{io_err, ReconcileError};
use crate::post_actions::{self, ActionContext, AppliedAction, PostAction, REGISTRY};
use crate::source::{self, GitCliFetcher, SourceRequest, TemplateFetcher, TemplateSet};
use crate::staged::Staged;
use crate::writer::{self, content_hash, WriteResult};

/// File whose presence marks a directory as an existing Python project.
pub const PROJECT_MARKER: &str = "pyproject.toml";

// ---------------------------------------------------------------------------
// Options and outcomes
// ---------------------------------------------------------------------------

/// Where to look for templates; both fields fall back to the lock record.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub template: Option<String>,
    pub vcs_ref: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Defaults to the target directory name.
    pub project: Option<ProjectName>,
    /// Defaults to `["api"]`.
    pub services: Vec<ServiceName>,
    pub source: SourceOptions,
    /// Extra render data, stored in the lock record.
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub source: SourceOptions,
    pub dry_run: bool,
}

/// Everything an operation did.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The lock record as saved (or, for a dry run, as it stands).
    pub record: LockRecord,
    pub writes: Vec<WriteResult>,
    pub actions: Vec<AppliedAction>,
    pub overridden: Vec<OverriddenKey>,
    pub unknown_categories: Vec<UnknownCategory>,
    pub dry_run: bool,
}

impl Outcome {
    pub fn changed(&self) -> impl Iterator<Item = &WriteResult> {
        self.writes.iter().filter(|w| w.is_change())
    }
}

/// What `update` would do, computed without touching disk.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub record: LockRecord,
    pub staged: Staged,
    pub origin: TemplateOrigin,
    pub services: Vec<ServiceName>,
    pub actions: Vec<AppliedAction>,
    pub consolidation: Consolidation,
    /// Managed files the template no longer produces: (path key, recorded hash).
    pub orphans: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<F = GitCliFetcher> {
    renderer: TemplateRenderer,
    fetcher: F,
    actions: &'static [PostAction],
}

impl Engine<GitCliFetcher> {
    pub fn new() -> Self {
        Engine::with_fetcher(GitCliFetcher::default())
    }
}

impl Default for Engine<GitCliFetcher> {
    fn default() -> Self {
        Engine::new()
    }
}

impl<F: TemplateFetcher> Engine<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Engine {
            renderer: TemplateRenderer::new(),
            fetcher,
            actions: REGISTRY,
        }
    }

    /// Swap the post action registry.
    pub fn with_actions(mut self, actions: &'static [PostAction]) -> Self {
        self.actions = actions;
        self
    }

    fn templates(
        &self,
        root: &Path,
        opts: &SourceOptions,
        recorded: Option<&TemplateOrigin>,
    ) -> Result<(TemplateSet, TemplateOrigin), ReconcileError> {
        let request = SourceRequest {
            explicit: opts.template.as_deref(),
            vcs_ref: opts.vcs_ref.as_deref(),
            recorded,
        };
        let resolved = source::resolve(root, &request)?;
        let (dir, mut origin) = source::materialize(&resolved, &self.fetcher)?;
        let set = TemplateSet::locate(&dir)?;
        origin.version = set.manifest.version;
        Ok((set, origin))
    }

    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Bootstrap a new project at `root`.
    pub fn init(&self, root: &Path, opts: InitOptions) -> Result<Outcome, ReconcileError> {
        for marker in [lock::LOCK_FILE, PROJECT_MARKER] {
            if root.join(marker).exists() {
                return Err(ReconcileError::AlreadyInitialized {
                    path: root.to_path_buf(),
                    marker: marker.to_owned(),
                });
            }
        }

        let services = if opts.services.is_empty() {
            vec![DEFAULT_SERVICE.parse::<ServiceName>()?]
        } else {
            opts.services.clone()
        };
        for (idx, name) in services.iter().enumerate() {
            if services[..idx].contains(name) {
                return Err(ReconcileError::ServiceAlreadyExists {
                    name: name.to_string(),
                    reason: "requested more than once".to_owned(),
                });
            }
        }

        let project = match opts.project.clone() {
            Some(p) => p,
            None => {
                let dir_name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ProjectName::from_dir_name(&dir_name)?
            }
        };

        let (set, origin) = self.templates(root, &opts.source, None)?;
        let ctx = RenderContext::for_project(&project, &services, set.manifest.version)
            .with_data(opts.data.clone());

        let mut staged = Staged::new(root);
        staged.stage_tree(Path::new(""), self.renderer.render_tree(&set.project_dir, &ctx)?);
        for name in &services {
            let tree = self.renderer.render_tree(&set.app_dir, &ctx.for_service(name))?;
            staged.stage_tree(&region::service_dir(name), tree);
        }

        let mut action_ctx = ActionContext {
            staged: &mut staged,
            services: services.clone(),
        };
        let actions = post_actions::run(self.actions, set.manifest.version, &[], &mut action_ctx)?;
        let services = action_ctx.services;

        let consolidation = consolidate::consolidate(&staged, &services)?;
        stage_updates(&mut staged, &consolidation);

        std::fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
        let writes = writer::write_staged(&staged, false)?;

        let now = Utc::now();
        let mut record = LockRecord::new(project, origin, &services, now);
        record.applied_actions = post_actions::ids_up_to(self.actions, set.manifest.version);
        record.data = opts.data;
        record.files = managed_hashes(&staged);
        lock::save_at(root, &record)?;
        tracing::info!("initialised {} with {} service(s)", record.project, services.len());

        Ok(Outcome {
            record,
            writes,
            actions,
            overridden: consolidation.overridden,
            unknown_categories: consolidation.unknown,
            dry_run: false,
        })
    }

    // -----------------------------------------------------------------------
    // add_service
    // -----------------------------------------------------------------------

    /// Bootstrap one more service into an existing project.
    pub fn add_service(
        &self,
        root: &Path,
        name: ServiceName,
        opts: &SourceOptions,
    ) -> Result<Outcome, ReconcileError> {
        let mut record = lock::load_at(root)?;
        if record.has_service(&name) {
            return Err(ReconcileError::ServiceAlreadyExists {
                name: name.to_string(),
                reason: format!("already recorded in {}", lock::LOCK_FILE),
            });
        }
        let dir = region::service_dir(&name);
        if dir_has_content(&root.join(&dir))? {
            return Err(ReconcileError::ServiceAlreadyExists {
                name: name.to_string(),
                reason: format!("{} already exists", region::path_key(&dir)),
            });
        }

        let (set, origin) = self.templates(root, opts, Some(&record.template))?;
        let mut services = record.service_names();
        services.push(name.clone());
        let ctx = RenderContext::for_project(&record.project, &services, set.manifest.version)
            .with_data(record.data.clone())
            .for_service(&name);

        let mut staged = Staged::new(root);
        staged.stage_tree(&dir, self.renderer.render_tree(&set.app_dir, &ctx)?);
        post_actions::ensure_apps_package(&mut staged);

        let consolidation = consolidate::consolidate(&staged, &services)?;
        stage_updates(&mut staged, &consolidation);

        let writes = writer::write_staged(&staged, false)?;

        let now = Utc::now();
        record.push_service(name.clone(), now);
        record.last_run = now;
        if record.template != origin {
            tracing::info!("template source is now {}", origin.source);
            record.template = origin;
        }
        record.files.extend(managed_hashes(&staged));
        lock::save_at(root, &record)?;
        tracing::info!("added service {name} to {}", record.project);

        Ok(Outcome {
            record,
            writes,
            actions: Vec::new(),
            overridden: consolidation.overridden,
            unknown_categories: consolidation.unknown,
            dry_run: false,
        })
    }

    // -----------------------------------------------------------------------
    // update
    // -----------------------------------------------------------------------

    /// Compute what `update` would do. Reads only.
    pub fn plan_update(&self, root: &Path, opts: &SourceOptions) -> Result<UpdatePlan, ReconcileError> {
        let record = lock::load_at(root)?;
        let (set, origin) = self.templates(root, opts, Some(&record.template))?;

        let services = record.service_names();
        let ctx = RenderContext::for_project(&record.project, &services, set.manifest.version)
            .with_data(record.data.clone());

        let mut staged = Staged::new(root);
        staged.stage_tree(Path::new(""), self.renderer.render_tree(&set.project_dir, &ctx)?);

        let mut action_ctx = ActionContext {
            staged: &mut staged,
            services,
        };
        let actions = post_actions::run(
            self.actions,
            set.manifest.version,
            &record.applied_actions,
            &mut action_ctx,
        )?;
        let services = action_ctx.services;

        let consolidation = consolidate::consolidate(&staged, &services)?;
        stage_updates(&mut staged, &consolidation);

        let produced = managed_hashes(&staged);
        let orphans = record
            .files
            .iter()
            .filter(|(key, _)| !produced.contains_key(*key) && !region::is_editable(Path::new(key)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(UpdatePlan {
            record,
            staged,
            origin,
            services,
            actions,
            consolidation,
            orphans,
        })
    }

    /// Re-apply the root template and consolidate.
    pub fn update(&self, root: &Path, opts: &UpdateOptions) -> Result<Outcome, ReconcileError> {
        let plan = self.plan_update(root, &opts.source)?;

        let mut writes = writer::write_staged(&plan.staged, opts.dry_run)?;
        writes.extend(writer::remove_orphans(root, &plan.orphans, opts.dry_run)?);

        let UpdatePlan {
            mut record,
            staged,
            origin,
            services,
            actions,
            consolidation,
            ..
        } = plan;

        if !opts.dry_run {
            let now = Utc::now();
            record.last_run = now;
            record.template = origin;
            for action in &actions {
                if !record.has_applied(&action.id) {
                    record.applied_actions.push(action.id.clone());
                }
            }
            for name in services {
                if record.push_service(name.clone(), now) {
                    tracing::info!("adopted service {name}");
                }
            }
            record.files = managed_hashes(&staged);
            lock::save_at(root, &record)?;
        }

        Ok(Outcome {
            record,
            writes,
            actions,
            overridden: consolidation.overridden,
            unknown_categories: consolidation.unknown,
            dry_run: opts.dry_run,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn stage_updates(staged: &mut Staged, consolidation: &Consolidation) {
    for update in &consolidation.updates {
        staged.stage(update.path.clone(), update.contents.clone());
    }
}

/// Path key → hash for every staged framework-owned file.
fn managed_hashes(staged: &Staged) -> BTreeMap<String, String> {
    staged
        .files()
        .iter()
        .filter(|(rel, _)| !region::is_editable(rel))
        .map(|(rel, bytes)| (region::path_key(rel), content_hash(bytes)))
        .collect()
}

fn dir_has_content(dir: &Path) -> Result<bool, ReconcileError> {
    if !dir.is_dir() {
        return Ok(dir.exists());
    }
    let mut entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    Ok(entries.next().is_some())
}

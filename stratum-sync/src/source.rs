//! Template source resolution, fetching and layout discovery.
//!
//! Precedence, highest first:
//!
//! 1. an explicit source (`--template` or `STRATUM_TEMPLATE`)
//! 2. a `templates/` directory inside the target project
//! 3. the source recorded in `.stratum.lock`
//!
//! Remote sources are cloned with the `git` CLI into the user cache directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use stratum_core::TemplateOrigin;

use crate::error::{io_err, ReconcileError};

/// Environment variable consulted when no `--template` flag is given.
pub const TEMPLATE_ENV: &str = "STRATUM_TEMPLATE";

/// Template directory looked up inside the target project.
pub const LOCAL_TEMPLATES_DIR: &str = "templates";

/// Optional manifest at the template root.
pub const MANIFEST_FILE: &str = "manifest.yaml";

const PROJECT_TEMPLATE: &str = "project";
const APP_TEMPLATE: &str = "app";

const REMOTE_PREFIXES: &[&str] = &["https://", "http://", "ssh://", "git@", "file://"];

// ---------------------------------------------------------------------------
// TemplateSource
// ---------------------------------------------------------------------------

/// A classified template location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Local(PathBuf),
    Remote { url: String, vcs_ref: Option<String> },
}

impl TemplateSource {
    /// Classify a raw source string.
    ///
    /// `gh:owner/repo` expands to GitHub, `git+` prefixes are stripped, and
    /// network URLs gain a `.git` suffix. Anything else is a local path.
    pub fn parse(raw: &str, vcs_ref: Option<&str>) -> Self {
        match normalize_remote(raw) {
            Some(url) => TemplateSource::Remote {
                url,
                vcs_ref: vcs_ref.map(str::to_owned),
            },
            None => TemplateSource::Local(PathBuf::from(raw)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, TemplateSource::Remote { .. })
    }
}

fn normalize_remote(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let stripped = raw.strip_prefix("git+").unwrap_or(raw);
    let mut url = if let Some(rest) = stripped.strip_prefix("gh:") {
        format!("https://github.com/{}", rest.trim_start_matches('/'))
    } else if REMOTE_PREFIXES.iter().any(|p| stripped.starts_with(p)) {
        stripped.to_owned()
    } else {
        return None;
    };
    if !url.starts_with("file://") && !url.ends_with(".git") {
        url = format!("{}.git", url.trim_end_matches('/'));
    }
    Some(url)
}

/// Inputs to [`resolve`]; everything the caller knows about where templates
/// might live.
#[derive(Debug, Clone, Default)]
pub struct SourceRequest<'a> {
    /// `--template` flag, or `STRATUM_TEMPLATE` when the flag is absent.
    pub explicit: Option<&'a str>,
    /// `--vcs-ref`; overrides the recorded ref.
    pub vcs_ref: Option<&'a str>,
    pub recorded: Option<&'a TemplateOrigin>,
}

/// Pick the template source for an operation on `target`.
pub fn resolve(target: &Path, request: &SourceRequest<'_>) -> Result<TemplateSource, ReconcileError> {
    if let Some(raw) = request.explicit.filter(|s| !s.trim().is_empty()) {
        tracing::debug!("template source from explicit request: {raw}");
        return Ok(TemplateSource::parse(raw, request.vcs_ref));
    }

    // A Django `templates/` directory of HTML files is not a template set.
    let local = target.join(LOCAL_TEMPLATES_DIR);
    if has_template_layout(&local) || has_template_layout(&local.join(LOCAL_TEMPLATES_DIR)) {
        tracing::debug!("template source from local directory: {}", local.display());
        return Ok(TemplateSource::Local(local));
    }

    if let Some(origin) = request.recorded {
        tracing::debug!("template source from lock record: {}", origin.source);
        let vcs_ref = request.vcs_ref.or(origin.vcs_ref.as_deref());
        return Ok(TemplateSource::parse(&origin.source, vcs_ref));
    }

    Err(ReconcileError::TemplateSourceNotFound {
        reason: format!(
            "pass --template, set {TEMPLATE_ENV}, or add a {LOCAL_TEMPLATES_DIR}/ directory"
        ),
    })
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

/// Materialises a remote template repository on the local filesystem.
pub trait TemplateFetcher {
    fn fetch(&self, url: &str, vcs_ref: Option<&str>) -> Result<PathBuf, FetchError>;
}

/// Clones with the system `git` binary into a per-(url, ref) cache directory.
#[derive(Debug, Clone)]
pub struct GitCliFetcher {
    cache_root: PathBuf,
}

impl GitCliFetcher {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        GitCliFetcher {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_dir_for(&self, url: &str, vcs_ref: Option<&str>) -> PathBuf {
        let mut h = Sha256::new();
        h.update(url.as_bytes());
        h.update(b"@");
        h.update(vcs_ref.unwrap_or("HEAD").as_bytes());
        let digest = hex::encode(h.finalize());
        self.cache_root.join(&digest[..16])
    }
}

impl Default for GitCliFetcher {
    /// `<user cache>/stratum/templates`, falling back to the system temp dir.
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        GitCliFetcher::new(base.join("stratum").join("templates"))
    }
}

fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<(), FetchError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .map_err(|e| FetchError(format!("failed to run git: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(FetchError(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

impl TemplateFetcher for GitCliFetcher {
    fn fetch(&self, url: &str, vcs_ref: Option<&str>) -> Result<PathBuf, FetchError> {
        let dest = self.cache_dir_for(url, vcs_ref);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)
                .map_err(|e| FetchError(format!("cannot clear {}: {e}", dest.display())))?;
        }
        std::fs::create_dir_all(&self.cache_root)
            .map_err(|e| FetchError(format!("cannot create {}: {e}", self.cache_root.display())))?;

        let dest_str = dest.to_string_lossy().into_owned();
        tracing::info!("cloning {url} into {dest_str}");
        run_git(&["clone", "--quiet", url, &dest_str], None)?;
        if let Some(r) = vcs_ref {
            run_git(&["checkout", "--quiet", r], Some(&dest))?;
        }
        Ok(dest)
    }
}

/// Turn a resolved source into a local directory plus the origin to record.
pub fn materialize<F: TemplateFetcher>(
    source: &TemplateSource,
    fetcher: &F,
) -> Result<(PathBuf, TemplateOrigin), ReconcileError> {
    match source {
        TemplateSource::Local(path) => {
            let dir = path.canonicalize().map_err(|e| ReconcileError::TemplateSourceNotFound {
                reason: format!("{}: {e}", path.display()),
            })?;
            let origin = TemplateOrigin {
                source: dir.to_string_lossy().into_owned(),
                vcs_ref: None,
                version: 1,
            };
            Ok((dir, origin))
        }
        TemplateSource::Remote { url, vcs_ref } => {
            let dir = fetcher
                .fetch(url, vcs_ref.as_deref())
                .map_err(|e| ReconcileError::TemplateSourceNotFound {
                    reason: format!("{url}: {e}"),
                })?;
            let origin = TemplateOrigin {
                source: url.clone(),
                vcs_ref: vcs_ref.clone(),
                version: 1,
            };
            Ok((dir, origin))
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest { version: 1 }
    }
}

/// The project and app template directories of a materialised source.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub root: PathBuf,
    pub project_dir: PathBuf,
    pub app_dir: PathBuf,
    pub manifest: Manifest,
}

impl TemplateSet {
    /// Accepts `<root>/templates/{project,app}` or `<root>/{project,app}`.
    pub fn locate(root: &Path) -> Result<Self, ReconcileError> {
        let candidates = [root.join(LOCAL_TEMPLATES_DIR), root.to_path_buf()];
        for base in candidates {
            if has_template_layout(&base) {
                let project_dir = base.join(PROJECT_TEMPLATE);
                let app_dir = base.join(APP_TEMPLATE);
                let manifest = read_manifest(&base)?;
                tracing::debug!(
                    "using templates at {} (version {})",
                    base.display(),
                    manifest.version
                );
                return Ok(TemplateSet {
                    root: base,
                    project_dir,
                    app_dir,
                    manifest,
                });
            }
        }
        Err(ReconcileError::TemplateSourceNotFound {
            reason: format!(
                "{} has no {PROJECT_TEMPLATE}/ and {APP_TEMPLATE}/ template directories",
                root.display()
            ),
        })
    }
}

fn has_template_layout(base: &Path) -> bool {
    base.join(PROJECT_TEMPLATE).is_dir() && base.join(APP_TEMPLATE).is_dir()
}

fn read_manifest(base: &Path) -> Result<Manifest, ReconcileError> {
    let path = base.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(Manifest::default());
    }
    let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if text.trim().is_empty() {
        return Ok(Manifest::default());
    }
    serde_yaml::from_str(&text).map_err(|e| ReconcileError::TemplateSourceNotFound {
        reason: format!("invalid {}: {e}", path.display()),
    })
}

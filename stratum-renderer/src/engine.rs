//! Directory renderer — walks a template directory and renders it in memory.
//!
//! # Template conventions
//!
//! | Template file              | Output                                      |
//! |----------------------------|---------------------------------------------|
//! | `README.md.tera`           | `README.md`, rendered with Tera             |
//! | `settings.yaml.jinja`      | `settings.yaml`, rendered with Tera         |
//! | `static/logo.png`          | copied byte-for-byte                        |
//! | `{{ project_name }}/urls.py` | path component rendered, file copied      |
//! | `{% if x %}opt{% endif %}/` | component rendering to `""` drops the subtree |
//!
//! Templates under `_partials/` are loaded for `{% include %}` only and never
//! emitted. `.git` directories are never walked. Nothing is written here; callers hand
//! the [`RenderedTree`] to a writer once every render in an operation has
//! succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::RenderContext;
use crate::error::{io_err, RenderError};

/// Suffixes marking a file as a template; stripped from the output name.
const TEMPLATE_SUFFIXES: &[&str] = &[".tera", ".jinja"];

/// Directory whose templates are available to `{% include %}` but never emitted.
const PARTIALS_DIR: &str = "_partials";

/// Rendered output: path relative to the render destination → file bytes.
pub type RenderedTree = BTreeMap<PathBuf, Vec<u8>>;

/// Files written by [`TemplateRenderer::render`], relative to the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub written: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn template_suffix(name: &str) -> Option<&'static str> {
    TEMPLATE_SUFFIXES.iter().copied().find(|s| name.ends_with(s))
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_err(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

// ---------------------------------------------------------------------------
// TemplateRenderer
// ---------------------------------------------------------------------------

/// Tera-backed renderer for whole template directories.
///
/// Stateless; a fresh [`Tera`] instance is built per directory so templates
/// from different sources never leak into each other's `{% include %}` scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        TemplateRenderer
    }

    /// Render every file under `template_dir` with `ctx`.
    ///
    /// Returns output paths relative to the render destination.
    pub fn render_tree(
        &self,
        template_dir: &Path,
        ctx: &RenderContext,
    ) -> Result<RenderedTree, RenderError> {
        if !template_dir.is_dir() {
            return Err(RenderError::MissingTemplateDir {
                path: template_dir.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        collect_template_files(template_dir, &mut files)?;

        let mut sources = Vec::new();
        let mut tera_items = Vec::new();
        for path in files {
            let rel = path.strip_prefix(template_dir).unwrap_or(path.as_path()).to_path_buf();
            let name = normalize_template_name(&rel);
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            if template_suffix(&name).is_some() {
                let text = String::from_utf8(bytes).map_err(|e| {
                    io_err(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })?;
                tera_items.push((name.clone(), text));
                sources.push((rel, name, None));
            } else {
                sources.push((rel, name, Some(bytes)));
            }
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(tera_items)
            .map_err(|source| RenderError::Tera {
                template: template_dir.display().to_string(),
                source,
            })?;

        let tera_ctx = ctx.to_tera_context()?;
        let mut tree = RenderedTree::new();
        for (rel, name, raw) in sources {
            if rel.components().any(|c| c.as_os_str() == PARTIALS_DIR) {
                continue;
            }
            let Some(out_path) = render_path(&rel, &name, &tera_ctx)? else {
                continue;
            };
            let contents = match raw {
                Some(bytes) => bytes,
                None => {
                    let rendered = tera.render(&name, &tera_ctx).map_err(|source| {
                        RenderError::Tera {
                            template: name.clone(),
                            source,
                        }
                    })?;
                    normalize_line_endings(&rendered).into_bytes()
                }
            };
            tree.insert(out_path, contents);
        }
        Ok(tree)
    }

    /// Render `template_dir` and write the result under `destination`,
    /// creating or overwriting files.
    ///
    /// Rendering finishes before the first write, so a template error leaves
    /// `destination` untouched.
    pub fn render(
        &self,
        template_dir: &Path,
        destination: &Path,
        ctx: &RenderContext,
    ) -> Result<RenderResult, RenderError> {
        let tree = self.render_tree(template_dir, ctx)?;
        let mut result = RenderResult::default();
        for (rel, contents) in tree {
            let path = destination.join(&rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            std::fs::write(&path, contents).map_err(|e| io_err(&path, e))?;
            tracing::debug!("rendered {}", path.display());
            result.written.push(rel);
        }
        Ok(result)
    }
}

/// Render each component of `rel`, strip the template suffix from the file
/// name, and return `None` when any component renders empty.
fn render_path(
    rel: &Path,
    name: &str,
    ctx: &tera::Context,
) -> Result<Option<PathBuf>, RenderError> {
    let mut out = PathBuf::new();
    let count = rel.components().count();
    for (idx, component) in rel.components().enumerate() {
        let raw = component.as_os_str().to_string_lossy();
        let mut rendered = if raw.contains("{{") || raw.contains("{%") {
            Tera::one_off(&raw, ctx, false).map_err(|source| RenderError::Tera {
                template: name.to_string(),
                source,
            })?
        } else {
            raw.into_owned()
        };
        if idx + 1 == count {
            if let Some(suffix) = template_suffix(&rendered) {
                rendered.truncate(rendered.len() - suffix.len());
            }
        }
        let rendered = rendered.trim().to_string();
        if rendered.is_empty() {
            return Ok(None);
        }
        if rendered == "." || rendered == ".." || rendered.contains(['/', '\\']) {
            return Err(RenderError::InvalidPath {
                template: name.to_string(),
                rendered,
            });
        }
        out.push(rendered);
    }
    Ok(Some(out))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

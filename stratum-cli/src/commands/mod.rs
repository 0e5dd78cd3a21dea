pub mod addservice;
pub mod completions;
pub mod diff;
pub mod init;
pub mod status;
pub mod update;
pub mod validate;

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use stratum_sync::{Outcome, SourceOptions, WriteResult, TEMPLATE_ENV};

/// Where templates come from. Flag beats env, env beats discovery.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Template source: local directory, git URL, or `gh:owner/repo`.
    #[arg(short = 't', long, env = TEMPLATE_ENV, value_name = "SOURCE")]
    pub template: Option<String>,

    /// Branch, tag or commit to check out for a remote template.
    #[arg(short = 'r', long, value_name = "REF")]
    pub vcs_ref: Option<String>,
}

impl From<SourceArgs> for SourceOptions {
    fn from(args: SourceArgs) -> Self {
        SourceOptions {
            template: args.template,
            vcs_ref: args.vcs_ref,
        }
    }
}

/// Project root for commands that act on an existing project.
#[derive(Args, Debug, Clone)]
pub struct ProjectDir {
    /// Project root directory.
    #[arg(short = 'C', long = "path", default_value = ".", value_name = "DIR")]
    pub path: PathBuf,
}

impl ProjectDir {
    pub fn resolve(&self) -> Result<PathBuf> {
        resolve_root(&self.path)
    }
}

/// Absolute, lexically normalised form of `path`. The directory need not exist.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot determine current directory")?
            .join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// `key=value` parser for `--data`.
pub fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

/// Per-file lines, applied actions and consolidation warnings.
pub fn print_outcome(outcome: &Outcome) {
    for write in &outcome.writes {
        print_write(write);
    }
    for action in &outcome.actions {
        println!("  {}  post action {}", "»".cyan(), action.id);
        for name in &action.outcome.adopted {
            println!("       adopted service '{name}'");
        }
    }
    for key in &outcome.overridden {
        println!(
            "  {}  {}: kept template value for '{}' (ignored {})",
            "!".yellow().bold(),
            key.artifact,
            key.key,
            key.ignored
        );
    }
    for unknown in &outcome.unknown_categories {
        println!(
            "  {}  service '{}': unknown fragment category '{}'",
            "?".yellow(),
            unknown.service,
            unknown.category
        );
    }
}

fn print_write(write: &WriteResult) {
    let path = write.path().display();
    match write {
        WriteResult::Written { .. } => println!("  {}  {path}", "✎".green()),
        WriteResult::WouldWrite { .. } => println!("  {}  {path}", "~".yellow()),
        WriteResult::Unchanged { .. } => println!("  {}  {path}", "·".bright_black()),
        WriteResult::Preserved { .. } => println!("  {}  {path} (preserved)", "=".blue()),
        WriteResult::Removed { .. } => println!("  {}  {path}", "✗".red()),
        WriteResult::WouldRemove { .. } => println!("  {}  {path} (would remove)", "~".red()),
    }
}

/// Count of writes that changed (or would change) the tree.
pub fn change_count(outcome: &Outcome) -> usize {
    outcome.changed().count()
}

//! `stratum status` — lock record and drift visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use stratum_core::{lock, types::LockRecord};
use stratum_sync::validate::{validate, Infraction, InfractionKind};
use stratum_sync::ReconcileError;

use super::ProjectDir;

/// Arguments for `stratum status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectDir,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let root = self.project.resolve()?;
        let record = lock::load_at(&root)
            .map_err(ReconcileError::from)
            .with_context(|| format!("cannot read project at '{}'", root.display()))?;
        let report = validate(&root)
            .with_context(|| format!("drift check failed for '{}'", root.display()))?;

        if self.json {
            print_json(&record, &report.infractions)?;
            return Ok(());
        }
        print_table(&record, &report.infractions, Utc::now());
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    project: &'a str,
    template: &'a stratum_core::types::TemplateOrigin,
    created_at: String,
    last_run: String,
    last_run_age: String,
    services: Vec<ServiceJson<'a>>,
    applied_actions: &'a [String],
    managed_files: usize,
    drift: &'a [Infraction],
}

#[derive(Serialize)]
struct ServiceJson<'a> {
    name: &'a str,
    module: String,
    bootstrapped_at: String,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "service")]
    name: String,
    #[tabled(rename = "module")]
    module: String,
    #[tabled(rename = "added")]
    added: String,
}

fn print_json(record: &LockRecord, drift: &[Infraction]) -> Result<()> {
    let payload = StatusJson {
        project: record.project.as_str(),
        template: &record.template,
        created_at: record.created_at.to_rfc3339(),
        last_run: record.last_run.to_rfc3339(),
        last_run_age: age(record.last_run, Utc::now()),
        services: record
            .services
            .iter()
            .map(|s| ServiceJson {
                name: s.name.as_str(),
                module: s.name.module_path(),
                bootstrapped_at: s.bootstrapped_at.to_rfc3339(),
            })
            .collect(),
        applied_actions: &record.applied_actions,
        managed_files: record.files.len(),
        drift,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(record: &LockRecord, drift: &[Infraction], now: DateTime<Utc>) {
    let template = match &record.template.vcs_ref {
        Some(vcs_ref) => format!("{}@{}", record.template.source, vcs_ref),
        None => record.template.source.clone(),
    };
    println!(
        "{} | template v{} | {} services | {} managed files | last run {} ago",
        record.project.as_str().bold(),
        record.template.version,
        record.services.len(),
        record.files.len(),
        age(record.last_run, now),
    );
    println!("  source: {template}");

    let separator = "■".repeat(60).bright_black().to_string();
    println!("{separator}");
    if record.services.is_empty() {
        println!("No services.");
    } else {
        let rows: Vec<ServiceRow> = record
            .services
            .iter()
            .map(|s| ServiceRow {
                name: s.name.to_string(),
                module: s.name.module_path(),
                added: format!("{} ago", age(s.bootstrapped_at, now)),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    println!("{separator}");

    if drift.is_empty() {
        println!("{} framework files match the lock record", "■".green().bold());
        return;
    }
    println!(
        "{} {} framework file(s) drifted:",
        "■".red().bold(),
        drift.len()
    );
    for infraction in drift {
        let label = match infraction.kind {
            InfractionKind::Modified => "modified",
            InfractionKind::Deleted => "deleted",
        };
        println!("  {label}: {}", infraction.path);
    }
    println!("Run 'stratum update' to restore them, or 'stratum diff' to review.");
}

/// Coarse elapsed time between `since` and `now`: `42s`, `5m`, `3h`, `2d`.
fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(since).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    }
}

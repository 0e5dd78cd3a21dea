//! `stratum validate` — report edits to framework-owned files.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use stratum_sync::validate::{validate, InfractionKind, PROTECTED_FILES};

use super::ProjectDir;

/// Arguments for `stratum validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub project: ProjectDir,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let root = self.project.resolve()?;
        let report = validate(&root)
            .with_context(|| format!("validate failed for '{}'", root.display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize validation report")?
            );
        } else {
            for infraction in &report.infractions {
                let label = match infraction.kind {
                    InfractionKind::Modified => "modified".red().bold(),
                    InfractionKind::Deleted => "deleted".magenta().bold(),
                };
                println!("  {}  {label}: {}", "✗".red(), infraction.path);
            }
        }

        if report.is_clean() {
            if !self.json {
                println!("✓ {} framework file(s) match the lock record", report.checked);
            }
            return Ok(());
        }
        bail!(
            "{} of {} framework file(s) changed; move edits into apps/ or list only the files you guard in {}",
            report.infractions.len(),
            report.checked,
            PROTECTED_FILES
        )
    }
}

//! `stratum update [--dry-run]`

use anyhow::{Context, Result};
use clap::Args;

use stratum_sync::{Engine, UpdateOptions};

use super::{change_count, print_outcome, ProjectDir, SourceArgs};

/// Re-apply the template to an existing project.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub project: ProjectDir,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Show what would change without touching disk or the lock record.
    #[arg(long)]
    pub dry_run: bool,
}

impl UpdateArgs {
    pub fn run(self) -> Result<()> {
        let root = self.project.resolve()?;
        let opts = UpdateOptions {
            source: self.source.into(),
            dry_run: self.dry_run,
        };
        let outcome = Engine::new()
            .update(&root, &opts)
            .with_context(|| format!("update failed for '{}'", root.display()))?;

        let prefix = if outcome.dry_run { "[dry-run] " } else { "" };
        print_outcome(&outcome);
        let changes = change_count(&outcome);
        if changes == 0 {
            println!("{prefix}✓ '{}' is up to date", outcome.record.project);
        } else {
            let verb = if outcome.dry_run { "would change" } else { "changed" };
            println!(
                "{prefix}✓ {changes} file(s) {verb} in '{}' (template v{})",
                outcome.record.project, outcome.record.template.version
            );
        }
        Ok(())
    }
}

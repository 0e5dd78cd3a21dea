//! `stratum diff` — show unified diffs for what update would write.

use anyhow::{Context, Result};
use clap::Args;

use stratum_sync::{diff::diff_update, Engine, SourceOptions};

use super::{ProjectDir, SourceArgs};

/// Arguments for `stratum diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub project: ProjectDir,

    #[command(flatten)]
    pub source: SourceArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let root = self.project.resolve()?;
        let source: SourceOptions = self.source.into();

        let diffs = diff_update(&Engine::new(), &root, &source)
            .with_context(|| format!("diff failed for '{}'", root.display()))?;

        if diffs.is_empty() {
            println!("No differences for '{}'.", root.display());
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}

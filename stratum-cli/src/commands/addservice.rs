//! `stratum addservice <name>`

use anyhow::{Context, Result};
use clap::Args;

use stratum_core::types::ServiceName;
use stratum_sync::{Engine, SourceOptions};

use super::{print_outcome, ProjectDir, SourceArgs};

/// Add a service (Django app) to an existing project.
#[derive(Args, Debug)]
pub struct AddServiceArgs {
    /// Service name; becomes `apps/<name>`.
    pub name: ServiceName,

    #[command(flatten)]
    pub project: ProjectDir,

    #[command(flatten)]
    pub source: SourceArgs,
}

impl AddServiceArgs {
    pub fn run(self) -> Result<()> {
        let root = self.project.resolve()?;
        let source: SourceOptions = self.source.into();
        let outcome = Engine::new()
            .add_service(&root, self.name.clone(), &source)
            .with_context(|| format!("failed to add service '{}'", self.name))?;

        print_outcome(&outcome);
        println!(
            "✓ Added service '{}' to project '{}'",
            self.name, outcome.record.project
        );
        println!("  Module: {}", self.name.module_path());
        Ok(())
    }
}

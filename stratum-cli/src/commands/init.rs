//! `stratum init [PATH] [--service <name>]... [--project <name>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use stratum_core::types::{ProjectName, ServiceName};
use stratum_sync::{Engine, InitOptions};

use super::{parse_key_val, print_outcome, resolve_root, SourceArgs};

/// Create a new project from the template.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to create the project in. Created if missing.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Root package name. Defaults to the directory name.
    #[arg(long, short = 'p')]
    pub project: Option<ProjectName>,

    /// Service to bootstrap; repeatable. Defaults to `api`.
    #[arg(long = "service", short = 's', alias = "services", num_args = 1.., value_name = "NAME")]
    pub services: Vec<ServiceName>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Extra template variable as key=value; repeatable.
    #[arg(long = "data", value_parser = parse_key_val, value_name = "KEY=VALUE")]
    pub data: Vec<(String, String)>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.path)?;
        let opts = InitOptions {
            project: self.project,
            services: self.services,
            source: self.source.into(),
            data: self.data.into_iter().collect(),
        };

        let outcome = Engine::new()
            .init(&root, opts)
            .with_context(|| format!("failed to init '{}'", root.display()))?;

        print_outcome(&outcome);
        let services: Vec<&str> = outcome
            .record
            .services
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        println!(
            "✓ Created project '{}' with services [{}]",
            outcome.record.project,
            services.join(", ")
        );
        println!("  Location: {}", root.display());
        println!(
            "  Template: {} (v{})",
            outcome.record.template.source, outcome.record.template.version
        );
        Ok(())
    }
}

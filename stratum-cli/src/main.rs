//! stratum — scaffold Django projects and keep them in step with their template.
//!
//! # Usage
//!
//! ```text
//! stratum init [PATH] [--service <name>]... [--project <name>] [--template <src>] [--vcs-ref <ref>] [--data k=v]...
//! stratum addservice <name> [--path <dir>] [--template <src>] [--vcs-ref <ref>]
//! stratum update [--path <dir>] [--template <src>] [--vcs-ref <ref>] [--dry-run]
//! stratum diff [--path <dir>]
//! stratum validate [--path <dir>] [--json]
//! stratum status [--path <dir>] [--json]
//! stratum completions <shell>
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use commands::{
    addservice::AddServiceArgs, completions::CompletionsArgs, diff::DiffArgs, init::InitArgs,
    status::StatusArgs, update::UpdateArgs, validate::ValidateArgs,
};
use stratum_sync::ReconcileError;

/// Overrides the default log filter, e.g. `STRATUM_LOG=stratum_sync=debug`.
const LOG_ENV: &str = "STRATUM_LOG";

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stratum",
    version,
    about = "Scaffold Django projects and reconcile them with their template",
    long_about = None,
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new project from the template.
    Init(InitArgs),

    /// Add a service (Django app) to an existing project.
    #[command(name = "addservice", alias = "add-service")]
    AddService(AddServiceArgs),

    /// Re-apply the template to an existing project.
    Update(UpdateArgs),

    /// Show unified diff of what update would write.
    Diff(DiffArgs),

    /// Check framework-owned files for local modifications.
    Validate(ValidateArgs),

    /// Show the project's lock record and drift summary.
    Status(StatusArgs),

    /// Print a shell completion script.
    Completions(CompletionsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<()> = match cli.command {
        Commands::Init(args) => args.run(),
        Commands::AddService(args) => args.run(),
        Commands::Update(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Validate(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Completions(args) => args.run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Print the error chain and map reconcile failures to their exit code.
fn report(err: &anyhow::Error) -> ExitCode {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ReconcileError>())
        .map(ReconcileError::kind);

    match kind {
        Some(kind) => {
            let tag = format!("error[{}]:", kind.label());
            eprintln!("{} {err:#}", tag.red().bold());
            ExitCode::from(u8::try_from(kind.exit_code()).unwrap_or(1))
        }
        None => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

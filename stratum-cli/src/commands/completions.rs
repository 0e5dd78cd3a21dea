//! `stratum completions <shell>`

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

/// Print a shell completion script to stdout.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    pub fn run(self) -> Result<()> {
        let mut cmd = crate::Cli::command();
        let name = cmd.get_name().to_owned();
        generate(self.shell, &mut cmd, name, &mut std::io::stdout());
        Ok(())
    }
}

//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod run;

pub use run::RunArgs;

use anyhow::Result;
use clap::Subcommand;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one job request to completion
    Run(RunArgs),
}

/// Handle a CLI command, returning the process exit code.
pub async fn handle_command(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => run::handle_run(args).await,
    }
}

mod serve;

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::args::Args;

pub trait Command {
    async fn execute(&self, args: &Args) -> Result<ExitCode>;
}

#[derive(Debug, Subcommand)]
pub enum TwlsCommand {
    /// Start the LSP server
    Serve(self::serve::Serve),
}

impl Command for TwlsCommand {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        match self {
            TwlsCommand::Serve(cmd) => cmd.execute(args).await,
        }
    }
}

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::args::Args;
use crate::commands::Command;

#[derive(Debug, Parser)]
pub struct Serve {
    /// Communicate over stdin and stdout. Editors always pass it; stdio is
    /// the only transport.
    #[arg(long)]
    #[allow(dead_code)]
    stdio: bool,
}

impl Command for Serve {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        twls_server::serve(args.global.log_filter()).await?;
        Ok(ExitCode::SUCCESS)
    }
}

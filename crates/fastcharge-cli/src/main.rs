mod bootstrap;
mod cli_args;
mod cli_types;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use crate::{bootstrap::init_tracing, cli_args::Cli, commands::run_cli};

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(error = ?error, "command failed");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

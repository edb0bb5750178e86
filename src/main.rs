// Tern - terminal copilot
// Main entry point

use clap::Parser;
use crossterm::style::Stylize;
use std::process::ExitCode;

use tern::cli::{run, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tern::logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

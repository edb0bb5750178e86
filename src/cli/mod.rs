// CLI definitions and dispatch

mod commands;
mod ui;

pub use commands::run;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Tern - natural language to shell commands via local model servers
#[derive(Debug, Parser)]
#[command(
    name = "tern",
    version,
    about = "Terminal copilot: turns requests into shell commands using local LLM servers",
    after_help = "Commands are printed, never executed. Config: ~/.config/tern/config.toml"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Do not block critical commands
    #[arg(long, global = true)]
    pub no_safety: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Suggest one shell command for a request
    Ask {
        #[arg(required = true, num_args = 1.., value_name = "REQUEST")]
        query: Vec<String>,

        /// Include cwd, git status and a directory listing in the prompt
        #[arg(long)]
        context: bool,
    },

    /// Explain what a command does
    Explain {
        #[arg(
            required = true,
            num_args = 1..,
            value_name = "COMMAND",
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },

    /// Chat with the model (interactive when no message is given)
    Chat {
        #[arg(num_args = 0.., value_name = "MESSAGE")]
        message: Vec<String>,
    },

    /// Break a goal into steps and walk them one at a time
    Plan {
        #[arg(required = true, num_args = 1.., value_name = "GOAL")]
        goal: Vec<String>,

        /// Show the plan without walking it
        #[arg(long)]
        dry_run: bool,

        /// Confirm every step that is not blocked and print the chained commands
        #[arg(short, long)]
        yes: bool,

        /// With --dry-run, print the plan as JSON
        #[arg(long, requires = "dry_run")]
        json: bool,
    },

    /// Show the risk assessment for a command
    Classify {
        #[arg(
            required = true,
            num_args = 1..,
            value_name = "COMMAND",
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },

    /// Probe every configured backend
    Backends,

    /// Write a commented default config file
    InitConfig,
}

/// Words given on the command line, joined back into one string.
pub(crate) fn joined(words: &[String]) -> String {
    words.join(" ").trim().to_string()
}

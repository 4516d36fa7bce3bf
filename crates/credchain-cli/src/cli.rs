// SPDX-License-Identifier: Apache-2.0

//! Command-line interface definition for credchain.

use std::io::IsTerminal;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Extended help text for the completion subcommand.
const COMPLETION_HELP: &str = r#"EXAMPLES

  bash
    Add to ~/.bashrc or ~/.bash_profile:
      eval "$(credchain completion bash)"

  zsh
    credchain completion zsh > ~/.zsh/completions/_credchain

  fish
    credchain completion fish > ~/.config/fish/completions/credchain.fish
"#;

/// Output format for CLI results.
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with colors (default)
    #[default]
    Text,
    /// JSON output for programmatic consumption
    Json,
}

/// Global output configuration passed to commands.
#[derive(Clone)]
pub struct OutputContext {
    /// Output format (text, json)
    pub format: OutputFormat,
    /// Enable verbose output
    pub verbose: bool,
    /// Whether stdout is a terminal (TTY)
    pub is_tty: bool,
}

impl OutputContext {
    /// Creates an `OutputContext` from CLI arguments.
    pub fn from_cli(format: OutputFormat, verbose: bool) -> Self {
        Self {
            format,
            verbose,
            is_tty: std::io::stdout().is_terminal(),
        }
    }
}

/// credchain - acquire cloud access tokens from the default credential chain.
///
/// Sources are tried in order until one produces a token: environment
/// variables, workload identity, managed identity, IDE sign-in, Azure CLI and
/// Azure Developer CLI.
#[derive(Parser)]
#[command(name = "credchain")]
#[command(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Output format (text, json)
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    pub output: OutputFormat,

    /// Enable verbose output (debug-level logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Acquire an access token from the default credential chain
    Token {
        /// Scope to request (repeatable), e.g. https://management.azure.com/.default
        #[arg(long = "scope", short = 's', required = true, value_name = "SCOPE")]
        scopes: Vec<String>,

        /// Tenant to request the token from
        #[arg(long)]
        tenant: Option<String>,

        /// Claims challenge returned by a resource
        #[arg(long)]
        claims: Option<String>,

        /// Print the access token itself
        #[arg(long)]
        show_secret: bool,
    },

    /// List the default chain's sources in the order they are tried
    Sources,

    /// Show the effective configuration and where it is read from
    Config,

    /// Generate a shell completion script (output to stdout)
    #[command(after_long_help = COMPLETION_HELP)]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

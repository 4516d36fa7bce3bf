// SPDX-License-Identifier: Apache-2.0

//! Command handlers for the credchain CLI.

pub mod completion;
pub mod config;
pub mod sources;
pub mod token;
pub mod types;

use anyhow::Result;
use credchain_core::ChainConfig;

use crate::cli::{Commands, OutputContext};
use crate::output;

/// Dispatch to the appropriate command handler.
pub async fn run(command: Commands, ctx: OutputContext, config: &ChainConfig) -> Result<()> {
    match command {
        Commands::Token {
            scopes,
            tenant,
            claims,
            show_secret,
        } => {
            let result = token::run(config, scopes, tenant, claims, show_secret).await?;
            output::render(&result, &ctx)
        }
        Commands::Sources => {
            let result = sources::run(config);
            output::render(&result, &ctx)
        }
        Commands::Config => {
            let result = config::run(config);
            output::render(&result, &ctx)
        }
        Commands::Completion { shell } => completion::run(shell),
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Acquire a token from the default credential chain.

use anyhow::{Context, Result};
use credchain_core::{
    ChainConfig, DefaultChainBuilder, EnvVars, TokenRequestContext, TokenSummary,
};
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

use super::types::TokenResult;

/// Builds the default chain from `config` and asks it for a token.
#[instrument(skip(config, claims))]
pub async fn run(
    config: &ChainConfig,
    scopes: Vec<String>,
    tenant: Option<String>,
    claims: Option<String>,
    show_secret: bool,
) -> Result<TokenResult> {
    let chain = DefaultChainBuilder::from_config(config, EnvVars::from_process())
        .build()
        .context("Failed to build the default credential chain")?;
    debug!(sources = ?chain.source_names(), "Requesting token");

    let ctx = TokenRequestContext::builder()
        .scopes(scopes.clone())
        .maybe_tenant_id(tenant)
        .maybe_claims(claims)
        .build();
    let token = chain.get_token(&ctx).await?;

    Ok(TokenResult {
        source: chain.pinned_source().map(str::to_string),
        scopes,
        summary: TokenSummary::from(&token),
        access_token: show_secret.then(|| token.secret().expose_secret().to_string()),
    })
}

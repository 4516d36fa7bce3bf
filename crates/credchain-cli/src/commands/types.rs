// SPDX-License-Identifier: Apache-2.0

//! Result types returned by command handlers.

use credchain_core::{ChainConfig, PlannedSource, TokenSummary};
use serde::Serialize;

/// Result from the token command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenResult {
    /// Source that produced the token.
    pub source: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Token metadata.
    #[serde(flatten)]
    pub summary: TokenSummary,
    /// The token itself, only with `--show-secret`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Result from the sources command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SourcesResult {
    /// Chain name used in diagnostics.
    pub chain: &'static str,
    /// Whether the first working source is pinned for later calls.
    pub reuse_on_success: bool,
    /// Every default source in order.
    pub sources: Vec<PlannedSource>,
}

/// Result from the config command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigResult {
    /// Configuration file location.
    pub path: String,
    /// Whether the file exists.
    pub exists: bool,
    /// Effective configuration (file merged with `CREDCHAIN_*` variables).
    pub config: ChainConfig,
}

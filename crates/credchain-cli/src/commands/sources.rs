// SPDX-License-Identifier: Apache-2.0

//! List the default chain's sources.

use credchain_core::{ChainConfig, DEFAULT_CREDENTIAL, DefaultChainBuilder, EnvVars};

use super::types::SourcesResult;

/// Plans the default chain from `config` without building any source.
pub fn run(config: &ChainConfig) -> SourcesResult {
    SourcesResult {
        chain: DEFAULT_CREDENTIAL,
        reuse_on_success: true,
        sources: DefaultChainBuilder::from_config(config, EnvVars::from_process()).plan(),
    }
}

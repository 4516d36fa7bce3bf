// SPDX-License-Identifier: Apache-2.0

//! Show the effective configuration.

use credchain_core::{ChainConfig, config_file_path};

use super::types::ConfigResult;

/// Reports where configuration is read from and what it resolved to.
pub fn run(config: &ChainConfig) -> ConfigResult {
    let path = config_file_path();
    ConfigResult {
        exists: path.is_file(),
        path: path.display().to_string(),
        config: config.clone(),
    }
}

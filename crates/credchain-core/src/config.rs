// SPDX-License-Identifier: Apache-2.0

//! Configuration management for the default credential chain.
//!
//! Provides layered configuration from files and environment variables.
//! Uses XDG-compliant paths with environment variable support.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables (prefix: `CREDCHAIN_`)
//! 2. Config file: `~/.config/credchain/config.toml`
//! 3. Built-in defaults
//!
//! Values left unset here fall back to the standard `AZURE_*` variables when
//! the chain is built (see [`crate::DefaultChainBuilder`]).
//!
//! # Examples
//!
//! ```bash
//! # Skip the Azure Developer CLI source via environment variable
//! CREDCHAIN_EXCLUDE__AZURE_DEVELOPER_CLI=true credchain token --scope https://management.azure.com/.default
//! ```

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::retry::DEFAULT_MAX_RETRIES;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "CREDCHAIN";

/// Chain configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Settings shared by every source.
    pub chain: ChainSettings,
    /// Managed identity settings.
    pub managed_identity: ManagedIdentityConfig,
    /// Workload identity settings.
    pub workload_identity: WorkloadIdentityConfig,
    /// Developer CLI settings.
    pub cli: CliConfig,
    /// Sources to leave out of the default chain.
    pub exclude: ExcludeConfig,
}

/// Settings shared by every source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Default tenant.
    pub tenant_id: Option<String>,
    /// Tenants sources may also acquire tokens for; `*` allows any.
    pub additionally_allowed_tenants: Vec<String>,
    /// Authority host, e.g. `https://login.microsoftonline.com`.
    pub authority_host: Option<String>,
}

/// Managed identity settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagedIdentityConfig {
    /// Client id of a user-assigned identity.
    pub client_id: Option<String>,
    /// Resource id of a user-assigned identity.
    pub resource_id: Option<String>,
    /// Retries for transient endpoint failures.
    pub max_retries: usize,
}

impl Default for ManagedIdentityConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            resource_id: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Workload identity settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadIdentityConfig {
    /// Client id of the federated application.
    pub client_id: Option<String>,
}

/// Developer CLI settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Subprocess timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
        }
    }
}

/// Sources to leave out of the default chain.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ExcludeConfig {
    /// Skip `EnvironmentCredential`.
    pub environment: bool,
    /// Skip `WorkloadIdentityCredential`.
    pub workload_identity: bool,
    /// Skip `ManagedIdentityCredential`.
    pub managed_identity: bool,
    /// Skip `IdeCredential`.
    pub ide: bool,
    /// Skip `AzureCliCredential`.
    pub azure_cli: bool,
    /// Skip `AzureDeveloperCliCredential`.
    pub azure_developer_cli: bool,
}

/// Returns the credchain configuration directory.
///
/// Respects the `XDG_CONFIG_HOME` environment variable if set,
/// otherwise defaults to `~/.config/credchain`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return PathBuf::from(xdg_config).join("credchain");
    }
    dirs::home_dir()
        .map_or_else(|| PathBuf::from(".config"), |home| home.join(".config"))
        .join("credchain")
}

/// Returns the path to the configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load chain configuration from the default file and environment.
///
/// # Errors
///
/// Returns `AuthError::Config` if the config file exists but is invalid.
pub fn load_config() -> Result<ChainConfig, AuthError> {
    load_config_from(&config_file_path())
}

/// Load chain configuration from `path` (optional) and environment variables.
///
/// Environment variables use the prefix `CREDCHAIN_` and double underscore
/// for nested keys (e.g., `CREDCHAIN_CLI__TIMEOUT_SECONDS`). The allowed tenant
/// list is `;`-separated.
///
/// # Errors
///
/// Returns `AuthError::Config` if the file exists but cannot be parsed.
pub fn load_config_from(path: &Path) -> Result<ChainConfig, AuthError> {
    let config = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(";")
                .with_list_parse_key("chain.additionally_allowed_tenants")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

// SPDX-License-Identifier: Apache-2.0

//! The default "works everywhere" credential chain.
//!
//! Sources are tried in this fixed order:
//!
//! 1. [`EnvironmentCredential`]
//! 2. [`WorkloadIdentityCredential`]
//! 3. [`ManagedIdentityCredential`]
//! 4. [`IdeCredential`]
//! 5. [`AzureCliCredential`]
//! 6. [`AzureDeveloperCliCredential`]
//!
//! Settings left unset fall back to the standard `AZURE_*` environment
//! variables. The chain pins the first source that works and goes straight to
//! it on later calls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::chain::ChainedCredential;
use crate::config::{ChainConfig, ExcludeConfig};
use crate::env::{
    AZURE_AUTHORITY_HOST, AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID, EnvVars,
};
use crate::error::AuthError;
use crate::retry::DEFAULT_MAX_RETRIES;
use crate::source::CredentialSource;
use crate::sources::{
    AzureCliCredential, AzureDeveloperCliCredential, ClientOptions, DEFAULT_PROCESS_TIMEOUT,
    DeveloperCliOptions, EnvironmentCredential, IdeCredential, ManagedIdentityCredential,
    ManagedIdentityId, WorkloadIdentityCredential,
};

/// Diagnostic name of the default chain.
pub const DEFAULT_CREDENTIAL: &str = "DefaultCredential";

/// Source names of the default chain, in the order they are tried.
pub const DEFAULT_CHAIN_ORDER: [&str; 6] = [
    EnvironmentCredential::NAME,
    WorkloadIdentityCredential::NAME,
    ManagedIdentityCredential::NAME,
    IdeCredential::NAME,
    AzureCliCredential::NAME,
    AzureDeveloperCliCredential::NAME,
];

/// One source of the default chain and whether it will be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedSource {
    /// Source name.
    pub name: &'static str,
    /// `false` if excluded.
    pub included: bool,
}

/// Assembles the default credential chain.
///
/// # Examples
///
/// ```rust,no_run
/// use credchain_core::{DefaultChainBuilder, TokenRequestContext};
///
/// # async fn example() -> anyhow::Result<()> {
/// let chain = DefaultChainBuilder::new()
///     .exclude_azure_developer_cli(true)
///     .build()?;
/// let ctx = TokenRequestContext::for_scopes(["https://vault.azure.net/.default"]);
/// let token = chain.get_token(&ctx).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct DefaultChainBuilder {
    env: EnvVars,
    tenant_id: Option<String>,
    additionally_allowed_tenants: Option<Vec<String>>,
    authority_host: Option<String>,
    managed_identity_client_id: Option<String>,
    managed_identity_resource_id: Option<String>,
    managed_identity_max_retries: usize,
    workload_identity_client_id: Option<String>,
    cli_timeout: Duration,
    ide_settings_path: Option<PathBuf>,
    exclude: ExcludeConfig,
}

impl Default for DefaultChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultChainBuilder {
    /// Builder reading fallbacks from the current process environment.
    pub fn new() -> Self {
        Self::with_env(EnvVars::from_process())
    }

    /// Builder reading fallbacks from `env`.
    pub fn with_env(env: EnvVars) -> Self {
        Self {
            env,
            tenant_id: None,
            additionally_allowed_tenants: None,
            authority_host: None,
            managed_identity_client_id: None,
            managed_identity_resource_id: None,
            managed_identity_max_retries: DEFAULT_MAX_RETRIES,
            workload_identity_client_id: None,
            cli_timeout: DEFAULT_PROCESS_TIMEOUT,
            ide_settings_path: None,
            exclude: ExcludeConfig::default(),
        }
    }

    /// Seeds a builder from loaded configuration.
    pub fn from_config(config: &ChainConfig, env: EnvVars) -> Self {
        let mut builder = Self::with_env(env);
        builder.tenant_id.clone_from(&config.chain.tenant_id);
        if !config.chain.additionally_allowed_tenants.is_empty() {
            builder.additionally_allowed_tenants =
                Some(config.chain.additionally_allowed_tenants.clone());
        }
        builder.authority_host.clone_from(&config.chain.authority_host);
        builder
            .managed_identity_client_id
            .clone_from(&config.managed_identity.client_id);
        builder
            .managed_identity_resource_id
            .clone_from(&config.managed_identity.resource_id);
        builder.managed_identity_max_retries = config.managed_identity.max_retries;
        builder
            .workload_identity_client_id
            .clone_from(&config.workload_identity.client_id);
        builder.cli_timeout = Duration::from_secs(config.cli.timeout_seconds);
        builder.exclude = config.exclude;
        builder
    }

    /// Default tenant; falls back to `AZURE_TENANT_ID`.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Extra tenants; falls back to `AZURE_ADDITIONALLY_ALLOWED_TENANTS`.
    pub fn additionally_allowed_tenants(mut self, tenants: Vec<String>) -> Self {
        self.additionally_allowed_tenants = Some(tenants);
        self
    }

    /// Authority host; falls back to `AZURE_AUTHORITY_HOST`.
    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = Some(host.into());
        self
    }

    /// User-assigned managed identity by client id; falls back to
    /// `AZURE_CLIENT_ID` unless a resource id is given.
    pub fn managed_identity_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.managed_identity_client_id = Some(client_id.into());
        self
    }

    /// User-assigned managed identity by resource id.
    pub fn managed_identity_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.managed_identity_resource_id = Some(resource_id.into());
        self
    }

    /// Retries for transient managed identity endpoint failures.
    pub fn managed_identity_max_retries(mut self, max_retries: usize) -> Self {
        self.managed_identity_max_retries = max_retries;
        self
    }

    /// Workload identity application; falls back to `AZURE_CLIENT_ID`.
    pub fn workload_identity_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.workload_identity_client_id = Some(client_id.into());
        self
    }

    /// Time each developer CLI may take.
    pub fn cli_timeout(mut self, timeout: Duration) -> Self {
        self.cli_timeout = timeout;
        self
    }

    /// IDE settings file to read instead of the default location.
    pub fn ide_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ide_settings_path = Some(path.into());
        self
    }

    /// Replaces every exclusion flag.
    pub fn exclude(mut self, exclude: ExcludeConfig) -> Self {
        self.exclude = exclude;
        self
    }

    /// Leave out [`EnvironmentCredential`].
    pub fn exclude_environment(mut self, exclude: bool) -> Self {
        self.exclude.environment = exclude;
        self
    }

    /// Leave out [`WorkloadIdentityCredential`].
    pub fn exclude_workload_identity(mut self, exclude: bool) -> Self {
        self.exclude.workload_identity = exclude;
        self
    }

    /// Leave out [`ManagedIdentityCredential`].
    pub fn exclude_managed_identity(mut self, exclude: bool) -> Self {
        self.exclude.managed_identity = exclude;
        self
    }

    /// Leave out [`IdeCredential`].
    pub fn exclude_ide(mut self, exclude: bool) -> Self {
        self.exclude.ide = exclude;
        self
    }

    /// Leave out [`AzureCliCredential`].
    pub fn exclude_azure_cli(mut self, exclude: bool) -> Self {
        self.exclude.azure_cli = exclude;
        self
    }

    /// Leave out [`AzureDeveloperCliCredential`].
    pub fn exclude_azure_developer_cli(mut self, exclude: bool) -> Self {
        self.exclude.azure_developer_cli = exclude;
        self
    }

    /// Every default source in order, marked with whether it is included.
    #[must_use]
    pub fn plan(&self) -> Vec<PlannedSource> {
        let excluded = [
            self.exclude.environment,
            self.exclude.workload_identity,
            self.exclude.managed_identity,
            self.exclude.ide,
            self.exclude.azure_cli,
            self.exclude.azure_developer_cli,
        ];
        DEFAULT_CHAIN_ORDER
            .iter()
            .zip(excluded)
            .map(|(&name, excluded)| PlannedSource {
                name,
                included: !excluded,
            })
            .collect()
    }

    /// Builds the chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] if every source is excluded, if
    /// both a managed identity client id and resource id are given, or if a
    /// tenant id or authority host is invalid.
    #[instrument(skip(self))]
    pub fn build(self) -> Result<ChainedCredential, AuthError> {
        let tenant_id = self
            .tenant_id
            .clone()
            .or_else(|| self.env.get(AZURE_TENANT_ID).map(str::to_string));
        let allowed = self
            .additionally_allowed_tenants
            .clone()
            .unwrap_or_else(|| self.env.additionally_allowed_tenants());
        let authority_host = self
            .authority_host
            .clone()
            .or_else(|| self.env.get(AZURE_AUTHORITY_HOST).map(str::to_string));
        let client_options = ClientOptions {
            authority_host: authority_host.clone(),
            additionally_allowed_tenants: allowed.clone(),
        };
        let cli_options = DeveloperCliOptions {
            tenant_id: tenant_id.clone(),
            additionally_allowed_tenants: allowed,
            timeout: self.cli_timeout,
        };

        let mut sources: Vec<Arc<dyn CredentialSource>> = Vec::new();

        if !self.exclude.environment {
            sources.push(Arc::new(EnvironmentCredential::with_options(
                &self.env,
                client_options.clone(),
            )));
        }

        if !self.exclude.workload_identity {
            let client_id = self
                .workload_identity_client_id
                .as_deref()
                .or_else(|| self.env.get(AZURE_CLIENT_ID));
            sources.push(Arc::new(WorkloadIdentityCredential::from_parts(
                tenant_id.as_deref(),
                client_id,
                self.env.get(AZURE_FEDERATED_TOKEN_FILE),
                client_options,
            )));
        }

        if !self.exclude.managed_identity {
            let client_id = match (
                &self.managed_identity_client_id,
                &self.managed_identity_resource_id,
            ) {
                (Some(client_id), _) => Some(client_id.clone()),
                (None, None) => self.env.get(AZURE_CLIENT_ID).map(str::to_string),
                (None, Some(_)) => None,
            };
            let id = ManagedIdentityId::from_options(
                client_id,
                self.managed_identity_resource_id.clone(),
            )?;
            sources.push(Arc::new(ManagedIdentityCredential::from_env(
                &self.env,
                id,
                self.managed_identity_max_retries,
            )?));
        }

        if !self.exclude.ide {
            let mut ide = IdeCredential::new(cli_options.clone(), authority_host.as_deref())?;
            if let Some(path) = &self.ide_settings_path {
                ide = ide.with_settings_path(path);
            }
            sources.push(Arc::new(ide));
        }

        if !self.exclude.azure_cli {
            sources.push(Arc::new(AzureCliCredential::with_options(cli_options.clone())?));
        }

        if !self.exclude.azure_developer_cli {
            sources.push(Arc::new(AzureDeveloperCliCredential::with_options(
                cli_options,
            )?));
        }

        if sources.is_empty() {
            return Err(AuthError::misconfigured(
                "every source of the default credential chain is excluded",
            ));
        }

        let chain = ChainedCredential::new(sources)?
            .with_name(DEFAULT_CREDENTIAL)
            .with_reuse_on_success(true);
        debug!(sources = ?chain.source_names(), "Built default credential chain");
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::AZURE_ADDITIONALLY_ALLOWED_TENANTS;

    fn builder() -> DefaultChainBuilder {
        DefaultChainBuilder::with_env(EnvVars::empty())
    }

    #[test]
    fn test_default_order() {
        let chain = builder().build().unwrap();
        assert_eq!(chain.source_names(), DEFAULT_CHAIN_ORDER);
        assert!(chain.reuse_on_success());
        assert!(chain.pinned_source().is_none());
    }

    #[test]
    fn test_exclusions_keep_relative_order() {
        let chain = builder()
            .exclude_environment(true)
            .exclude_managed_identity(true)
            .exclude_azure_developer_cli(true)
            .build()
            .unwrap();
        assert_eq!(
            chain.source_names(),
            [
                WorkloadIdentityCredential::NAME,
                IdeCredential::NAME,
                AzureCliCredential::NAME
            ]
        );
    }

    #[test]
    fn test_everything_excluded_fails() {
        let exclude = ExcludeConfig {
            environment: true,
            workload_identity: true,
            managed_identity: true,
            ide: true,
            azure_cli: true,
            azure_developer_cli: true,
        };
        let err = builder().exclude(exclude).build().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_managed_identity_client_and_resource_id_conflict() {
        let err = builder()
            .managed_identity_client_id("client")
            .managed_identity_resource_id("/subscriptions/s/resourceGroups/g")
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Misconfigured { .. }));
    }

    #[test]
    fn test_env_client_id_does_not_conflict_with_resource_id() {
        let env = EnvVars::empty().with(AZURE_CLIENT_ID, "from-env");
        DefaultChainBuilder::with_env(env)
            .managed_identity_resource_id("/subscriptions/s/resourceGroups/g")
            .build()
            .unwrap();
    }

    #[test]
    fn test_invalid_env_tenant_fails_fast() {
        let env = EnvVars::empty().with(AZURE_TENANT_ID, "not a tenant!");
        let err = DefaultChainBuilder::with_env(env).build().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_authority_host_fails_fast() {
        let env = EnvVars::empty().with(AZURE_AUTHORITY_HOST, "login.example.com");
        assert!(DefaultChainBuilder::with_env(env).build().is_err());
    }

    #[test]
    fn test_env_fallbacks_accept_allowed_tenants() {
        let env = EnvVars::empty()
            .with(AZURE_TENANT_ID, "tenant-a")
            .with(AZURE_ADDITIONALLY_ALLOWED_TENANTS, "tenant-b;tenant-c");
        let chain = DefaultChainBuilder::with_env(env).build().unwrap();
        assert_eq!(chain.source_names().len(), DEFAULT_CHAIN_ORDER.len());
    }

    #[test]
    fn test_from_config() {
        let mut config = ChainConfig::default();
        config.exclude.ide = true;
        config.exclude.managed_identity = true;
        config.cli.timeout_seconds = 3;
        config.chain.tenant_id = Some("tenant-a".to_string());

        let builder = DefaultChainBuilder::from_config(&config, EnvVars::empty());
        assert_eq!(builder.cli_timeout, Duration::from_secs(3));
        let plan = builder.plan();
        assert!(!plan[2].included);
        assert!(!plan[3].included);
        assert!(plan[0].included);

        let chain = builder.build().unwrap();
        assert_eq!(chain.source_names().len(), 4);
    }

    #[test]
    fn test_plan_lists_every_source() {
        let plan = builder().exclude_azure_cli(true).plan();
        let names: Vec<_> = plan.iter().map(|p| p.name).collect();
        assert_eq!(names, DEFAULT_CHAIN_ORDER);
        assert_eq!(plan.iter().filter(|p| !p.included).count(), 1);
    }
}

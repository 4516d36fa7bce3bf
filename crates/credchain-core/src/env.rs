// SPDX-License-Identifier: Apache-2.0

//! Environment variable snapshot.
//!
//! Sources and the default chain builder read configuration from an
//! [`EnvVars`] snapshot instead of the live process environment, so tests can
//! supply their own values without touching global state.

use std::collections::HashMap;

/// Tenant of the application or user.
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Client (application) id.
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Client secret for service principal authentication.
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Path to a client certificate (not supported, reported as unavailable).
pub const AZURE_CLIENT_CERTIFICATE_PATH: &str = "AZURE_CLIENT_CERTIFICATE_PATH";
/// Username for username/password authentication.
pub const AZURE_USERNAME: &str = "AZURE_USERNAME";
/// Password for username/password authentication.
pub const AZURE_PASSWORD: &str = "AZURE_PASSWORD";
/// Authority host, e.g. `https://login.microsoftonline.com`.
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
/// `;`-separated list of tenants a credential may also acquire tokens for.
pub const AZURE_ADDITIONALLY_ALLOWED_TENANTS: &str = "AZURE_ADDITIONALLY_ALLOWED_TENANTS";
/// Path to the federated token file projected by the workload identity webhook.
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
/// App Service / Functions managed identity endpoint.
pub const IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
/// Secret header value for the App Service managed identity endpoint.
pub const IDENTITY_HEADER: &str = "IDENTITY_HEADER";
/// Overrides the instance metadata host (pod identity).
pub const AZURE_POD_IDENTITY_AUTHORITY_HOST: &str = "AZURE_POD_IDENTITY_AUTHORITY_HOST";

/// Every variable captured by [`EnvVars::from_process`].
const KNOWN_VARS: &[&str] = &[
    AZURE_TENANT_ID,
    AZURE_CLIENT_ID,
    AZURE_CLIENT_SECRET,
    AZURE_CLIENT_CERTIFICATE_PATH,
    AZURE_USERNAME,
    AZURE_PASSWORD,
    AZURE_AUTHORITY_HOST,
    AZURE_ADDITIONALLY_ALLOWED_TENANTS,
    AZURE_FEDERATED_TOKEN_FILE,
    IDENTITY_ENDPOINT,
    IDENTITY_HEADER,
    AZURE_POD_IDENTITY_AUTHORITY_HOST,
];

/// Immutable snapshot of identity-related environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Captures the identity-related variables of the current process.
    #[must_use]
    pub fn from_process() -> Self {
        let vars = KNOWN_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| ((*name).to_string(), v)))
            .collect();
        Self { vars }
    }

    /// An empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy with one variable set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Value of `name`, treating empty values as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// `true` if `name` is set to a non-empty value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parsed `AZURE_ADDITIONALLY_ALLOWED_TENANTS`.
    #[must_use]
    pub fn additionally_allowed_tenants(&self) -> Vec<String> {
        self.get(AZURE_ADDITIONALLY_ALLOWED_TENANTS)
            .map(parse_tenant_list)
            .unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Splits a `;`-separated tenant list, dropping empty entries.
#[must_use]
pub fn parse_tenant_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let env = EnvVars::empty().with(AZURE_TENANT_ID, "  ");
        assert_eq!(env.get(AZURE_TENANT_ID), None);
        assert!(!env.contains(AZURE_TENANT_ID));
    }

    #[test]
    fn test_from_iter() {
        let env: EnvVars = [(AZURE_CLIENT_ID, "client"), (AZURE_TENANT_ID, "tenant")]
            .into_iter()
            .collect();
        assert_eq!(env.get(AZURE_CLIENT_ID), Some("client"));
        assert_eq!(env.get(AZURE_TENANT_ID), Some("tenant"));
    }

    #[test]
    fn test_additionally_allowed_tenants() {
        let env = EnvVars::empty().with(AZURE_ADDITIONALLY_ALLOWED_TENANTS, "a; b;;c ");
        assert_eq!(env.additionally_allowed_tenants(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_additionally_allowed_tenants_unset() {
        assert!(EnvVars::empty().additionally_allowed_tenants().is_empty());
    }
}

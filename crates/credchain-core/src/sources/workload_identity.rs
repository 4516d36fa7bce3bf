// SPDX-License-Identifier: Apache-2.0

//! Kubernetes workload identity federation.
//!
//! The identity webhook projects a service account token into the pod and
//! points `AZURE_FEDERATED_TOKEN_FILE` at it. That token is exchanged for an
//! access token as a client assertion.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use super::{AssertionProvider, ClientAssertionCredential, ClientOptions};
use crate::context::TokenRequestContext;
use crate::env::{AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID, EnvVars};
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::token::AccessToken;

/// Reads the projected token file on every assertion request; the kubelet
/// rotates it in place.
#[derive(Debug)]
struct TokenFile {
    path: PathBuf,
}

#[async_trait]
impl AssertionProvider for TokenFile {
    async fn assertion(&self) -> Result<SecretString, AuthError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuthError::authentication_failed(format!(
                "failed to read federated token file '{}': {e}",
                self.path.display()
            ))
        })?;
        let content = content.trim();
        if content.is_empty() {
            return Err(AuthError::authentication_failed(format!(
                "federated token file '{}' is empty",
                self.path.display()
            )));
        }
        Ok(SecretString::from(content))
    }
}

/// Exchanges a projected service account token for an access token.
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    inner: Result<ClientAssertionCredential, String>,
}

impl WorkloadIdentityCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "WorkloadIdentityCredential";

    /// Creates the credential from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant, an empty
    /// client id, or an invalid authority host.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
        options: ClientOptions,
    ) -> Result<Self, AuthError> {
        let provider = Arc::new(TokenFile {
            path: token_file.into(),
        });
        let inner = ClientAssertionCredential::new(tenant_id, client_id, provider, options)?
            .named(Self::NAME);
        Ok(Self { inner: Ok(inner) })
    }

    /// Reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_FEDERATED_TOKEN_FILE` from `env`.
    #[must_use]
    pub fn from_env(env: &EnvVars, options: ClientOptions) -> Self {
        Self::from_parts(
            env.get(AZURE_TENANT_ID),
            env.get(AZURE_CLIENT_ID),
            env.get(AZURE_FEDERATED_TOKEN_FILE),
            options,
        )
    }

    /// Uses whichever settings are known; missing ones make the credential
    /// unavailable rather than failing construction.
    #[must_use]
    pub fn from_parts(
        tenant_id: Option<&str>,
        client_id: Option<&str>,
        token_file: Option<&str>,
        options: ClientOptions,
    ) -> Self {
        let (Some(tenant_id), Some(client_id), Some(token_file)) = (tenant_id, client_id, token_file)
        else {
            let reason = format!(
                "WorkloadIdentityCredential requires a tenant id, a client id and a token file. \
                 Set {AZURE_TENANT_ID}, {AZURE_CLIENT_ID} and {AZURE_FEDERATED_TOKEN_FILE}."
            );
            debug!(reason = %reason, "Workload identity not configured");
            return Self { inner: Err(reason) };
        };
        match Self::new(tenant_id, client_id, token_file, options) {
            Ok(credential) => credential,
            Err(err) => Self {
                inner: Err(format!("Workload identity settings are invalid: {err}")),
            },
        }
    }

    /// `true` if tenant, client id and token file are all known.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.is_ok()
    }
}

#[async_trait]
impl CredentialSource for WorkloadIdentityCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        match &self.inner {
            Ok(credential) => credential.acquire(ctx).await,
            Err(reason) => Err(AuthError::unavailable(reason.clone())),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Service principal or user authentication configured through `AZURE_*`
//! environment variables.
//!
//! | Variables | Mechanism |
//! |---|---|
//! | `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` | [`ClientSecretCredential`] |
//! | `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_USERNAME`, `AZURE_PASSWORD` | [`UsernamePasswordCredential`] |

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use super::{ClientOptions, ClientSecretCredential, UsernamePasswordCredential};
use crate::context::TokenRequestContext;
use crate::env::{
    AZURE_AUTHORITY_HOST, AZURE_CLIENT_CERTIFICATE_PATH, AZURE_CLIENT_ID, AZURE_CLIENT_SECRET,
    AZURE_PASSWORD, AZURE_TENANT_ID, AZURE_USERNAME, EnvVars,
};
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::token::AccessToken;

#[derive(Debug)]
enum Mechanism {
    ClientSecret(ClientSecretCredential),
    UsernamePassword(UsernamePasswordCredential),
    NotConfigured(String),
}

/// Delegates to the credential selected by the environment.
#[derive(Debug)]
pub struct EnvironmentCredential {
    mechanism: Mechanism,
}

impl EnvironmentCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "EnvironmentCredential";

    /// Reads the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_env(&EnvVars::from_process())
    }

    /// Reads `env`, taking the authority host and allowed tenants from it too.
    #[must_use]
    pub fn from_env(env: &EnvVars) -> Self {
        let options = ClientOptions {
            authority_host: env.get(AZURE_AUTHORITY_HOST).map(str::to_string),
            additionally_allowed_tenants: env.additionally_allowed_tenants(),
        };
        Self::with_options(env, options)
    }

    /// Reads credentials from `env` with explicit client options.
    ///
    /// Incomplete or invalid variables do not fail construction; the
    /// credential reports them as unavailable when asked for a token.
    #[must_use]
    pub fn with_options(env: &EnvVars, options: ClientOptions) -> Self {
        let mechanism = match select(env, options) {
            Ok(mechanism) => mechanism,
            Err(err) => Mechanism::NotConfigured(format!(
                "Environment variables are set but invalid: {err}"
            )),
        };
        if let Mechanism::NotConfigured(reason) = &mechanism {
            debug!(reason = %reason, "EnvironmentCredential not configured");
        }
        Self { mechanism }
    }

    /// `true` if the environment selected a mechanism.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !matches!(self.mechanism, Mechanism::NotConfigured(_))
    }
}

fn select(env: &EnvVars, options: ClientOptions) -> Result<Mechanism, AuthError> {
    let (Some(tenant_id), Some(client_id)) = (env.get(AZURE_TENANT_ID), env.get(AZURE_CLIENT_ID))
    else {
        return Ok(not_configured());
    };

    if let Some(secret) = env.get(AZURE_CLIENT_SECRET) {
        let credential = ClientSecretCredential::new(
            tenant_id,
            client_id,
            SecretString::from(secret),
            options,
        )?;
        return Ok(Mechanism::ClientSecret(credential));
    }

    if env.contains(AZURE_CLIENT_CERTIFICATE_PATH) {
        return Ok(Mechanism::NotConfigured(format!(
            "{AZURE_CLIENT_CERTIFICATE_PATH} is set but client certificate authentication is not supported. \
             Set {AZURE_CLIENT_SECRET} instead."
        )));
    }

    if let (Some(username), Some(password)) = (env.get(AZURE_USERNAME), env.get(AZURE_PASSWORD)) {
        let credential = UsernamePasswordCredential::new(
            tenant_id,
            client_id,
            username,
            SecretString::from(password),
            options,
        )?;
        return Ok(Mechanism::UsernamePassword(credential));
    }

    Ok(not_configured())
}

fn not_configured() -> Mechanism {
    Mechanism::NotConfigured(format!(
        "Environment variables are not fully configured. Set {AZURE_TENANT_ID} and \
         {AZURE_CLIENT_ID} with either {AZURE_CLIENT_SECRET}, or {AZURE_USERNAME} and \
         {AZURE_PASSWORD}."
    ))
}

#[async_trait]
impl CredentialSource for EnvironmentCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        match &self.mechanism {
            Mechanism::ClientSecret(credential) => credential.acquire(ctx).await,
            Mechanism::UsernamePassword(credential) => credential.acquire(ctx).await,
            Mechanism::NotConfigured(reason) => Err(AuthError::unavailable(reason.clone())),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Authentication through the Azure CLI's signed-in account.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use super::process::run;
use super::{DeveloperCliOptions, cached_or_acquire};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::{TokenRequestContext, scope_to_resource};
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::{resolve_tenant, validate_tenant_id};
use crate::token::AccessToken;

#[cfg(windows)]
const PROGRAM: &str = "az.cmd";
#[cfg(not(windows))]
const PROGRAM: &str = "az";

const NOT_LOGGED_IN: &str = "Please run 'az login' to set up an account";

/// `az account get-access-token --output json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    /// Local time, e.g. `2024-01-01 12:00:00.000000`.
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix seconds; newer CLI versions only.
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
    #[serde(default)]
    tenant: Option<String>,
}

/// Acquires tokens with `az account get-access-token`.
#[derive(Debug)]
pub struct AzureCliCredential {
    command: Vec<String>,
    options: DeveloperCliOptions,
    cache: TokenCache,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureCliCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "AzureCliCredential";

    /// Uses the CLI's signed-in tenant and the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command: vec![PROGRAM.to_string()],
            options: DeveloperCliOptions::default(),
            cache: TokenCache::default(),
        }
    }

    /// Creates the credential with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant id.
    pub fn with_options(options: DeveloperCliOptions) -> Result<Self, AuthError> {
        if let Some(tenant_id) = &options.tenant_id {
            validate_tenant_id(tenant_id)?;
        }
        Ok(Self {
            command: vec![PROGRAM.to_string()],
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            options,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    async fn request(
        &self,
        resource: &str,
        tenant: Option<&str>,
    ) -> Result<(AccessToken, CachedAccount), AuthError> {
        let mut args: Vec<&str> = self.command[1..].iter().map(String::as_str).collect();
        args.extend([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            resource,
        ]);
        if let Some(tenant) = tenant {
            args.extend(["--tenant", tenant]);
        }

        let output = run(&self.command[0], &args, self.options.timeout).await?;
        if !output.success {
            return Err(classify_stderr(&output.stderr));
        }
        let token = parse_token(&output.stdout)?;
        let account_tenant = token.tenant.clone().or_else(|| tenant.map(str::to_string));
        let access_token = into_access_token(token)?;
        Ok((access_token, CachedAccount::new("az", account_tenant)))
    }
}

fn classify_stderr(stderr: &str) -> AuthError {
    let stderr = stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("az login") || lower.contains("az account set") {
        debug!("Azure CLI is not signed in");
        return AuthError::unavailable(NOT_LOGGED_IN);
    }
    if lower.contains("not recognized") || lower.contains("command not found") {
        return AuthError::unavailable("Azure CLI not found on path");
    }
    AuthError::authentication_failed(format!("Azure CLI returned an error: {stderr}"))
}

fn parse_token(stdout: &str) -> Result<CliToken, AuthError> {
    serde_json::from_str(stdout).map_err(AuthError::InvalidResponse)
}

fn into_access_token(token: CliToken) -> Result<AccessToken, AuthError> {
    let expires_on = match (token.expires_on_unix, token.expires_on.as_deref()) {
        (Some(unix), _) => DateTime::from_timestamp(unix, 0),
        (None, Some(local)) => parse_local_time(local),
        (None, None) => None,
    }
    .ok_or_else(|| {
        AuthError::authentication_failed("Azure CLI returned a token without a valid expiry")
    })?;

    let access = AccessToken::new(token.access_token, expires_on);
    Ok(match token.token_type {
        Some(token_type) => access.with_token_type(token_type),
        None => access,
    })
}

fn parse_local_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl CredentialSource for AzureCliCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let scope = ctx.single_scope(Self::NAME)?;
        let tenant = resolve_tenant(
            Self::NAME,
            self.options.tenant_id.as_deref(),
            ctx,
            &self.options.additionally_allowed_tenants,
        )?;
        let scoped = ctx.retarget(tenant.clone());

        cached_or_acquire(&self.cache, &scoped, || {
            self.request(scope_to_resource(scope), tenant.as_deref())
        })
        .await
    }
}

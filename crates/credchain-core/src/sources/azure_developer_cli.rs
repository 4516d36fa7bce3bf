// SPDX-License-Identifier: Apache-2.0

//! Authentication through the Azure Developer CLI (`azd`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::process::run;
use super::{DeveloperCliOptions, cached_or_acquire};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::{resolve_tenant, validate_tenant_id};
use crate::token::AccessToken;

#[cfg(windows)]
const PROGRAM: &str = "azd.exe";
#[cfg(not(windows))]
const PROGRAM: &str = "azd";

const NOT_LOGGED_IN: &str =
    "Please run 'azd auth login' from a command prompt to authenticate before using this credential";

/// `azd auth token --output json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    expires_on: DateTime<Utc>,
}

/// Acquires tokens with `azd auth token`.
#[derive(Debug)]
pub struct AzureDeveloperCliCredential {
    command: Vec<String>,
    options: DeveloperCliOptions,
    cache: TokenCache,
}

impl Default for AzureDeveloperCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureDeveloperCliCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "AzureDeveloperCliCredential";

    /// Uses azd's signed-in tenant and the default timeout.
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
    fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    async fn request(
        &self,
        scopes: &[String],
        tenant: Option<&str>,
    ) -> Result<(AccessToken, CachedAccount), AuthError> {
        let mut args: Vec<&str> = self.command[1..].iter().map(String::as_str).collect();
        args.extend(["auth", "token", "--output", "json"]);
        for scope in scopes {
            args.extend(["--scope", scope.as_str()]);
        }
        if let Some(tenant) = tenant {
            args.extend(["--tenant-id", tenant]);
        }

        let output = run(&self.command[0], &args, self.options.timeout).await?;
        if !output.success {
            return Err(classify_stderr(&output.stderr));
        }
        let token: AzdToken =
            serde_json::from_str(&output.stdout).map_err(AuthError::InvalidResponse)?;
        Ok((
            AccessToken::new(token.token, token.expires_on),
            CachedAccount::new("azd", tenant.map(str::to_string)),
        ))
    }
}

fn classify_stderr(stderr: &str) -> AuthError {
    let stderr = stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("azd auth login") || lower.contains("not logged in") {
        return AuthError::unavailable(NOT_LOGGED_IN);
    }
    if lower.contains("not recognized") || lower.contains("command not found") {
        return AuthError::unavailable("Azure Developer CLI not found on path");
    }
    AuthError::authentication_failed(format!("Azure Developer CLI returned an error: {stderr}"))
}

#[async_trait]
impl CredentialSource for AzureDeveloperCliCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let tenant = resolve_tenant(
            Self::NAME,
            self.options.tenant_id.as_deref(),
            ctx,
            &self.options.additionally_allowed_tenants,
        )?;
        let scoped = ctx.retarget(tenant.clone());

        cached_or_acquire(&self.cache, &scoped, || {
            self.request(ctx.scopes(), tenant.as_deref())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_logged_in_is_unavailable() {
        let err = classify_stderr("ERROR: not logged in, run `azd auth login` to login");
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("azd auth login"));
    }

    #[test]
    fn test_other_stderr_is_authentication_failure() {
        let err = classify_stderr("ERROR: fetching token: AADSTS500011");
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_parse_rfc3339_expiry() {
        let token: AzdToken =
            serde_json::from_str(r#"{"token":"t","expiresOn":"2099-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(token.expires_on.timestamp(), 4_070_908_800);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passes_every_scope() {
        use secrecy::ExposeSecret;

        use crate::sources::process::script;

        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args");
        let body = format!(
            "echo \"$@\" > '{}'\necho '{{\"token\":\"from-azd\",\"expiresOn\":\"2099-01-01T00:00:00Z\"}}'",
            args_file.display()
        );
        let credential =
            AzureDeveloperCliCredential::new().with_command(script::command(&dir, "azd", &body));

        let token = credential
            .acquire(&TokenRequestContext::for_scopes(["scope-a", "scope-b"]))
            .await
            .unwrap();

        assert_eq!(token.secret().expose_secret(), "from-azd");
        let args = std::fs::read_to_string(&args_file).unwrap();
        assert!(args.contains("--scope scope-a --scope scope-b"));
    }
}

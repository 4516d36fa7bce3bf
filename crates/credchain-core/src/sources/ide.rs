// SPDX-License-Identifier: Apache-2.0

//! Authentication through the account an IDE's Azure tooling signed in with.
//!
//! The IDE's user settings record how the user signed in:
//!
//! ```json
//! { "azure.authMethod": "DeviceCode", "azure.tenant": "contoso.onmicrosoft.com" }
//! ```
//!
//! `AzureCli` delegates to [`AzureCliCredential`]. `DeviceCode` redeems the
//! refresh token the tooling stored in the system keyring, which requires the
//! `keyring` feature.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::authority::AuthorityClient;
use super::device_code::{DEVELOPER_CLIENT_ID, ORGANIZATIONS_TENANT};
use super::{AzureCliCredential, DeveloperCliOptions};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::resolve_tenant;
use crate::token::AccessToken;

#[cfg(feature = "keyring")]
const KEYRING_SERVICE: &str = "credchain-ide";
#[cfg(feature = "keyring")]
const KEYRING_USER: &str = "refresh-token";

const NOT_SIGNED_IN: &str = "IDE Azure tooling is not signed in";

/// How the IDE's Azure tooling signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IdeSignIn {
    /// Through the Azure CLI's account.
    AzureCli,
    /// Through a device code sign-in; the refresh token lives in the keyring.
    DeviceCode,
}

#[derive(Debug, Default, Deserialize)]
struct IdeSettings {
    #[serde(rename = "azure.authMethod", default)]
    auth_method: Option<IdeSignIn>,
    #[serde(rename = "azure.tenant", default)]
    tenant: Option<String>,
}

type RefreshTokenLookup = fn() -> Result<Option<SecretString>, AuthError>;

/// Reuses the IDE's Azure sign-in.
#[derive(Debug)]
pub struct IdeCredential {
    settings_path: Option<PathBuf>,
    additionally_allowed_tenants: Vec<String>,
    azure_cli: AzureCliCredential,
    authority: AuthorityClient,
    stored_refresh_token: RefreshTokenLookup,
    cache: TokenCache,
}

impl IdeCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "IdeCredential";

    /// Reads the IDE's default user settings file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant id or
    /// authority host.
    pub fn new(
        options: DeveloperCliOptions,
        authority_host: Option<&str>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            settings_path: default_settings_path(),
            additionally_allowed_tenants: options.additionally_allowed_tenants.clone(),
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            azure_cli: AzureCliCredential::with_options(options)?,
            authority: AuthorityClient::new(authority_host)?,
            stored_refresh_token: keyring_refresh_token,
        })
    }

    /// Reads sign-in settings from `path` instead of the default location.
    #[must_use]
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    #[cfg(test)]
    fn with_refresh_token_lookup(mut self, lookup: RefreshTokenLookup) -> Self {
        self.stored_refresh_token = lookup;
        self
    }

    #[cfg(test)]
    fn with_azure_cli(mut self, azure_cli: AzureCliCredential) -> Self {
        self.azure_cli = azure_cli;
        self
    }

    #[instrument(skip(self))]
    async fn settings(&self) -> Result<IdeSettings, AuthError> {
        let Some(path) = &self.settings_path else {
            return Err(AuthError::unavailable(
                "no IDE settings location on this platform",
            ));
        };
        read_settings(path).await
    }

    async fn redeem_stored_token(
        &self,
        settings: &IdeSettings,
        ctx: &TokenRequestContext,
    ) -> Result<AccessToken, AuthError> {
        let default_tenant = settings.tenant.as_deref().unwrap_or(ORGANIZATIONS_TENANT);
        let tenant = resolve_tenant(
            Self::NAME,
            Some(default_tenant),
            ctx,
            &self.additionally_allowed_tenants,
        )?
        .unwrap_or_else(|| default_tenant.to_string());
        let scoped = ctx.retarget(Some(tenant.clone()));

        if let Some(token) = self.cache.silent_token(&scoped).await {
            return Ok(token);
        }

        let Some(refresh_token) = (self.stored_refresh_token)()? else {
            return Err(AuthError::unavailable(format!(
                "{NOT_SIGNED_IN}: no stored device code sign-in was found"
            )));
        };

        let mut response = self
            .authority
            .redeem_refresh_token(&tenant, DEVELOPER_CLIENT_ID, &refresh_token, &scoped)
            .await?;
        let rotated = response.take_refresh_token().unwrap_or(refresh_token);
        let token = response.into_access_token();
        let account = CachedAccount::new("ide", Some(tenant)).with_refresh_token(rotated);
        self.cache.update(&token, account, &scoped).await;
        Ok(token)
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("Code").join("User").join("settings.json"))
}

async fn read_settings(path: &Path) -> Result<IdeSettings, AuthError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "IDE settings not readable");
            return Err(AuthError::unavailable(format!(
                "{NOT_SIGNED_IN}: settings file {} could not be read",
                path.display()
            )));
        }
    };
    serde_json::from_str(&raw).map_err(|err| {
        AuthError::unavailable(format!(
            "{NOT_SIGNED_IN}: settings file {} is not valid JSON ({err})",
            path.display()
        ))
    })
}

#[cfg(feature = "keyring")]
fn keyring_refresh_token() -> Result<Option<SecretString>, AuthError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .map_err(|err| AuthError::unavailable(format!("system keyring unavailable: {err}")))?;
    match entry.get_password() {
        Ok(token) => Ok(Some(SecretString::from(token))),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(AuthError::unavailable(format!(
            "system keyring unavailable: {err}"
        ))),
    }
}

#[cfg(not(feature = "keyring"))]
fn keyring_refresh_token() -> Result<Option<SecretString>, AuthError> {
    Err(AuthError::unavailable(
        "device code sign-in from the IDE requires the `keyring` feature",
    ))
}

#[async_trait]
impl CredentialSource for IdeCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let settings = self.settings().await?;
        match settings.auth_method {
            None => Err(AuthError::unavailable(NOT_SIGNED_IN)),
            Some(IdeSignIn::AzureCli) => {
                debug!("IDE signed in through the Azure CLI");
                self.azure_cli.acquire(ctx).await
            }
            Some(IdeSignIn::DeviceCode) => self.redeem_stored_token(&settings, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sources::test_support::token_body;

    fn settings_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn credential(host: Option<&str>, settings: &NamedTempFile) -> IdeCredential {
        IdeCredential::new(DeveloperCliOptions::default(), host)
            .unwrap()
            .with_settings_path(settings.path())
    }

    #[allow(clippy::unnecessary_wraps)]
    fn stored_token() -> Result<Option<SecretString>, AuthError> {
        Ok(Some(SecretString::from("ide-rt")))
    }

    #[allow(clippy::unnecessary_wraps)]
    fn nothing_stored() -> Result<Option<SecretString>, AuthError> {
        Ok(None)
    }

    fn ctx() -> TokenRequestContext {
        TokenRequestContext::for_scopes(["https://management.azure.com/.default"])
    }

    #[tokio::test]
    async fn test_missing_settings_is_unavailable() {
        let credential = IdeCredential::new(DeveloperCliOptions::default(), None)
            .unwrap()
            .with_settings_path("/nonexistent/credchain/settings.json");
        let err = credential.acquire(&ctx()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_no_sign_in_method_is_unavailable() {
        let settings = settings_file(r#"{"editor.fontSize": 14}"#);
        let err = credential(None, &settings).acquire(&ctx()).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("not signed in"));
    }

    #[tokio::test]
    async fn test_invalid_settings_is_unavailable() {
        let settings = settings_file("{ // comments\n }");
        let err = credential(None, &settings).acquire(&ctx()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_device_code_without_stored_token_is_unavailable() {
        let settings = settings_file(r#"{"azure.authMethod": "DeviceCode"}"#);
        let err = credential(None, &settings)
            .with_refresh_token_lookup(nothing_stored)
            .acquire(&ctx())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_device_code_redeems_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .and(body_string_contains("refresh_token=ide-rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("ide-token")))
            .expect(1)
            .mount(&server)
            .await;

        let settings =
            settings_file(r#"{"azure.authMethod": "DeviceCode", "azure.tenant": "contoso"}"#);
        let credential = credential(Some(&server.uri()), &settings)
            .with_refresh_token_lookup(stored_token);

        let token = credential.acquire(&ctx()).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "ide-token");
        // Second call is served from the cache.
        credential.acquire(&ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "AADSTS70008: The refresh token has expired."
            })))
            .mount(&server)
            .await;

        let settings = settings_file(r#"{"azure.authMethod": "DeviceCode"}"#);
        let err = credential(Some(&server.uri()), &settings)
            .with_refresh_token_lookup(stored_token)
            .acquire(&ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_azure_cli_sign_in_delegates() {
        use crate::sources::process::script;
        use crate::sources::test_support::expires_on_in_an_hour;

        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "echo '{{\"accessToken\":\"via-az\",\"expires_on\":{}}}'",
            expires_on_in_an_hour()
        );
        let settings = settings_file(r#"{"azure.authMethod": "AzureCli"}"#);
        let azure_cli = AzureCliCredential::new().with_command(script::command(&dir, "az", &body));
        let credential = credential(None, &settings).with_azure_cli(azure_cli);

        let token = credential.acquire(&ctx()).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "via-az");
    }
}

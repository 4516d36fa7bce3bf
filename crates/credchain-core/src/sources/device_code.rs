// SPDX-License-Identifier: Apache-2.0

//! Interactive sign-in with the OAuth2 device authorization grant.
//!
//! The user is shown a short code and a URL, completes sign-in on any device,
//! and the credential polls the token endpoint until the sign-in finishes.
//! Later requests redeem the issued refresh token silently.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::authority::{AuthorityClient, FormOutcome, public_client_scope};
use super::{ClientOptions, refresh_silently};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::{resolve_tenant, validate_tenant_id};
use crate::token::AccessToken;

/// Public client id of the Azure CLI, usable for device code sign-in.
pub(crate) const DEVELOPER_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
/// Tenant for work and school accounts in any directory.
pub(crate) const ORGANIZATIONS_TENANT: &str = "organizations";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

/// What the user needs to complete sign-in.
#[derive(Debug, Clone)]
pub struct DeviceCodeInfo {
    /// Code the user enters at the verification URL.
    pub user_code: String,
    /// Where the user signs in.
    pub verification_uri: String,
    /// Ready-to-print instructions from the authority.
    pub message: String,
    /// When the code stops being accepted.
    pub expires_on: DateTime<Utc>,
}

/// Shows [`DeviceCodeInfo`] to the user.
pub type DeviceCodePrompt = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Authenticates a user through the device code flow.
pub struct DeviceCodeCredential {
    tenant_id: String,
    client_id: String,
    prompt: DeviceCodePrompt,
    additionally_allowed_tenants: Vec<String>,
    authority: AuthorityClient,
    cache: TokenCache,
}

impl DeviceCodeCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "DeviceCodeCredential";

    /// Creates the credential. `tenant_id` defaults to `organizations` and
    /// `client_id` to the Azure CLI's public client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant or
    /// authority host.
    pub fn new(
        tenant_id: Option<String>,
        client_id: Option<String>,
        prompt: DeviceCodePrompt,
        options: ClientOptions,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.unwrap_or_else(|| ORGANIZATIONS_TENANT.to_string());
        validate_tenant_id(&tenant_id)?;
        Ok(Self {
            tenant_id,
            client_id: client_id.unwrap_or_else(|| DEVELOPER_CLIENT_ID.to_string()),
            prompt,
            authority: AuthorityClient::new(options.authority_host.as_deref())?,
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            additionally_allowed_tenants: options.additionally_allowed_tenants,
        })
    }

    /// Prints the sign-in instructions to stderr.
    #[must_use]
    pub fn stderr_prompt() -> DeviceCodePrompt {
        Arc::new(|info: &DeviceCodeInfo| eprintln!("{}", info.message))
    }

    async fn sign_in(
        &self,
        tenant: &str,
        ctx: &TokenRequestContext,
    ) -> Result<(AccessToken, CachedAccount), AuthError> {
        let scope = public_client_scope(ctx.scopes());
        let code: DeviceCodeResponse = self
            .authority
            .post_json(
                &self.authority.device_code_endpoint(tenant),
                &[("client_id", self.client_id.as_str()), ("scope", scope.as_str())],
            )
            .await?;

        let lifetime = i64::try_from(code.expires_in).unwrap_or(i64::from(u32::MAX));
        let expires_on = Utc::now() + chrono::Duration::seconds(lifetime);
        let info = DeviceCodeInfo {
            message: code.message.clone().unwrap_or_else(|| {
                format!(
                    "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                    code.verification_uri, code.user_code
                )
            }),
            user_code: code.user_code,
            verification_uri: code.verification_uri,
            expires_on,
        };
        (self.prompt)(&info);

        let mut interval = Duration::from_secs(code.interval);
        let mut form = vec![
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.client_id.as_str()),
            ("device_code", code.device_code.as_str()),
        ];
        if let Some(claims) = ctx.claims() {
            form.push(("claims", claims));
        }
        let url = self.authority.token_endpoint(tenant);

        loop {
            if Utc::now() >= expires_on {
                return Err(AuthError::authentication_failed(
                    "the device code expired before sign-in completed",
                ));
            }
            tokio::time::sleep(interval).await;

            match self.authority.post_form(&url, &form).await? {
                FormOutcome::Token(mut response) => {
                    info!("Device code sign-in completed");
                    let mut account = CachedAccount::new(&self.client_id, Some(tenant.to_string()));
                    if let Some(refresh_token) = response.take_refresh_token() {
                        account = account.with_refresh_token(refresh_token);
                    }
                    return Ok((response.into_access_token(), account));
                }
                FormOutcome::Rejected { body, .. } if body.error == "authorization_pending" => {
                    debug!("Waiting for device code sign-in");
                }
                FormOutcome::Rejected { body, .. } if body.error == "slow_down" => {
                    interval += SLOW_DOWN_INCREMENT;
                }
                FormOutcome::Rejected { status, body } => return Err(body.into_error(status)),
            }
        }
    }
}

impl fmt::Debug for DeviceCodeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialSource for DeviceCodeCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let tenant = resolve_tenant(
            Self::NAME,
            Some(&self.tenant_id),
            ctx,
            &self.additionally_allowed_tenants,
        )?
        .unwrap_or_else(|| self.tenant_id.clone());
        let scoped = ctx.retarget(Some(tenant.clone()));

        if let Some(token) = self.cache.silent_token(&scoped).await {
            return Ok(token);
        }
        if let Some(token) =
            refresh_silently(&self.cache, &self.authority, &tenant, &self.client_id, &scoped).await
        {
            return Ok(token);
        }

        let (token, account) = self.sign_in(&tenant, ctx).await?;
        self.cache.update(&token, account, &scoped).await;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use secrecy::ExposeSecret;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn device_code_body(expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "device_code": "dc-1",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": expires_in,
            "interval": 0
        })
    }

    fn credential(server: &MockServer, shown: Arc<Mutex<Vec<String>>>) -> DeviceCodeCredential {
        let prompt: DeviceCodePrompt = Arc::new(move |info: &DeviceCodeInfo| {
            shown.lock().unwrap().push(info.user_code.clone());
        });
        DeviceCodeCredential::new(
            Some("tenant".to_string()),
            None,
            prompt,
            ClientOptions {
                authority_host: Some(server.uri()),
                ..ClientOptions::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_polls_until_signed_in_then_reuses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(900)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("device_code=dc-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "authorization_pending"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "user-token",
                "expires_in": 3600,
                "refresh_token": "rt"
            })))
            .mount(&server)
            .await;

        let shown = Arc::new(Mutex::new(Vec::new()));
        let credential = credential(&server, shown.clone());
        let ctx = TokenRequestContext::for_scopes(["https://graph.microsoft.com/.default"]);

        let token = credential.acquire(&ctx).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "user-token");
        assert_eq!(shown.lock().unwrap().as_slice(), ["ABCD-EFGH"]);

        // Cached: no second prompt.
        credential.acquire(&ctx).await.unwrap();
        assert_eq!(shown.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_declined_sign_in_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(900)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "authorization_declined",
                "error_description": "The user declined."
            })))
            .mount(&server)
            .await;

        let err = credential(&server, Arc::default())
            .acquire(&TokenRequestContext::for_scopes(["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("declined"));
    }

    #[tokio::test]
    async fn test_expired_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(0)))
            .mount(&server)
            .await;

        let err = credential(&server, Arc::default())
            .acquire(&TokenRequestContext::for_scopes(["a"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
    }
}

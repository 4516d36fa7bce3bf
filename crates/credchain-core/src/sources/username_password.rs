// SPDX-License-Identifier: Apache-2.0

//! User authentication with a username and password (resource owner password
//! credentials grant).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::authority::{AuthorityClient, public_client_scope};
use super::{ClientOptions, refresh_silently};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::{resolve_tenant, validate_tenant_id};
use crate::token::AccessToken;

/// Authenticates a user with their password.
///
/// Later calls redeem the refresh token returned by the first sign-in
/// instead of sending the password again.
#[derive(Debug)]
pub struct UsernamePasswordCredential {
    tenant_id: String,
    client_id: String,
    username: String,
    password: SecretString,
    additionally_allowed_tenants: Vec<String>,
    authority: AuthorityClient,
    cache: TokenCache,
}

impl UsernamePasswordCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "UsernamePasswordCredential";

    /// Creates the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant, an empty
    /// client id, username or password, or an invalid authority host.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        options: ClientOptions,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        let username = username.into();
        validate_tenant_id(&tenant_id)?;
        if client_id.trim().is_empty() || username.trim().is_empty() {
            return Err(AuthError::misconfigured(
                "client id and username must not be empty",
            ));
        }
        if password.expose_secret().is_empty() {
            return Err(AuthError::misconfigured("password must not be empty"));
        }
        Ok(Self {
            tenant_id,
            client_id,
            username,
            password,
            authority: AuthorityClient::new(options.authority_host.as_deref())?,
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            additionally_allowed_tenants: options.additionally_allowed_tenants,
        })
    }
}

#[async_trait]
impl CredentialSource for UsernamePasswordCredential {
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

        let scope = public_client_scope(ctx.scopes());
        let mut form = vec![
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret()),
            ("scope", scope.as_str()),
        ];
        if let Some(claims) = ctx.claims() {
            form.push(("claims", claims));
        }
        let mut response = self.authority.request_token(&tenant, &form).await?;

        let mut account =
            CachedAccount::new(&self.username, Some(tenant.clone())).with_username(&self.username);
        if let Some(refresh_token) = response.take_refresh_token() {
            account = account.with_refresh_token(refresh_token);
        }
        let token = response.into_access_token();
        self.cache.update(&token, account, &scoped).await;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credential(server: &MockServer) -> UsernamePasswordCredential {
        UsernamePasswordCredential::new(
            "home",
            "public-client",
            "user@contoso.com",
            SecretString::from("hunter2"),
            ClientOptions {
                authority_host: Some(server.uri()),
                ..ClientOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_username() {
        let err = UsernamePasswordCredential::new(
            "home",
            "client",
            " ",
            SecretString::from("pw"),
            ClientOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_second_scope_uses_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "first",
                "expires_in": 3600,
                "refresh_token": "rt-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "second",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = credential(&server);
        credential
            .acquire(&TokenRequestContext::for_scopes(["scope-a"]))
            .await
            .unwrap();
        let token = credential
            .acquire(&TokenRequestContext::for_scopes(["scope-b"]))
            .await
            .unwrap();

        assert_eq!(token.secret().expose_secret(), "second");
        let account = credential.cache.cached_account().await.unwrap();
        assert_eq!(account.username(), Some("user@contoso.com"));
        assert_eq!(account.scopes(), ["scope-b"]);
    }

    #[tokio::test]
    async fn test_wrong_password_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "AADSTS50126: Error validating credentials."
            })))
            .mount(&server)
            .await;

        let err = credential(&server)
            .acquire(&TokenRequestContext::for_scopes(["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("AADSTS50126"));
    }
}

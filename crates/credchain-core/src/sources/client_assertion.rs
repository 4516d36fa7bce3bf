// SPDX-License-Identifier: Apache-2.0

//! Service principal authentication with a signed client assertion.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::authority::{AuthorityClient, join_scopes};
use super::{ClientOptions, cached_or_acquire};
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::source::CredentialSource;
use crate::tenant::{resolve_tenant, validate_tenant_id};
use crate::token::AccessToken;

const JWT_BEARER: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Supplies a fresh client assertion (a signed JWT) on every token request.
#[async_trait]
pub trait AssertionProvider: Send + Sync {
    /// Returns the assertion to present to the authority.
    async fn assertion(&self) -> Result<SecretString, AuthError>;
}

/// Authenticates an application with a client assertion from an
/// [`AssertionProvider`].
pub struct ClientAssertionCredential {
    name: &'static str,
    tenant_id: String,
    client_id: String,
    provider: Arc<dyn AssertionProvider>,
    additionally_allowed_tenants: Vec<String>,
    authority: AuthorityClient,
    cache: TokenCache,
}

impl ClientAssertionCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "ClientAssertionCredential";

    /// Creates the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant, an empty
    /// client id, or an invalid authority host.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        provider: Arc<dyn AssertionProvider>,
        options: ClientOptions,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        validate_tenant_id(&tenant_id)?;
        if client_id.trim().is_empty() {
            return Err(AuthError::misconfigured("client id must not be empty"));
        }
        Ok(Self {
            name: Self::NAME,
            tenant_id,
            client_id,
            provider,
            authority: AuthorityClient::new(options.authority_host.as_deref())?,
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            additionally_allowed_tenants: options.additionally_allowed_tenants,
        })
    }

    /// Reports errors under another source's name.
    pub(crate) fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl fmt::Debug for ClientAssertionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAssertionCredential")
            .field("name", &self.name)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialSource for ClientAssertionCredential {
    fn name(&self) -> &str {
        self.name
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let tenant = resolve_tenant(
            self.name,
            Some(&self.tenant_id),
            ctx,
            &self.additionally_allowed_tenants,
        )?
        .unwrap_or_else(|| self.tenant_id.clone());
        let scoped = ctx.retarget(Some(tenant.clone()));

        cached_or_acquire(&self.cache, &scoped, || async {
            let assertion = self.provider.assertion().await?;
            let scope = join_scopes(ctx.scopes());
            let mut form = vec![
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_assertion_type", JWT_BEARER),
                ("client_assertion", assertion.expose_secret()),
                ("scope", scope.as_str()),
            ];
            if let Some(claims) = ctx.claims() {
                form.push(("claims", claims));
            }
            let token = self
                .authority
                .request_token(&tenant, &form)
                .await?
                .into_access_token();
            Ok((token, CachedAccount::new(&self.client_id, Some(tenant.clone()))))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sources::test_support::token_body;

    struct Counting(AtomicU32);

    #[async_trait]
    impl AssertionProvider for Counting {
        async fn assertion(&self) -> Result<SecretString, AuthError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SecretString::from(format!("jwt-{n}")))
        }
    }

    #[tokio::test]
    async fn test_presents_assertion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/home/oauth2/v2.0/token"))
            .and(body_string_contains("client_assertion=jwt-0"))
            .and(body_string_contains("client_assertion_type=urn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t")))
            .mount(&server)
            .await;

        let provider = Arc::new(Counting(AtomicU32::new(0)));
        let credential = ClientAssertionCredential::new(
            "home",
            "client",
            provider.clone(),
            ClientOptions {
                authority_host: Some(server.uri()),
                ..ClientOptions::default()
            },
        )
        .unwrap();

        let ctx = TokenRequestContext::for_scopes(["a"]);
        credential.acquire(&ctx).await.unwrap();
        // Served from cache: no new assertion.
        credential.acquire(&ctx).await.unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_propagated() {
        struct Failing;

        #[async_trait]
        impl AssertionProvider for Failing {
            async fn assertion(&self) -> Result<SecretString, AuthError> {
                Err(AuthError::unavailable("no assertion"))
            }
        }

        let credential = ClientAssertionCredential::new(
            "home",
            "client",
            Arc::new(Failing),
            ClientOptions::default(),
        )
        .unwrap()
        .named("Renamed");

        assert_eq!(credential.name(), "Renamed");
        let err = credential
            .acquire(&TokenRequestContext::for_scopes(["a"]))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}

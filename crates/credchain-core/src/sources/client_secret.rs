// SPDX-License-Identifier: Apache-2.0

//! Service principal authentication with a client secret.

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

/// Authenticates an application with the OAuth2 client credentials grant.
#[derive(Debug)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    secret: SecretString,
    additionally_allowed_tenants: Vec<String>,
    authority: AuthorityClient,
    cache: TokenCache,
}

impl ClientSecretCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "ClientSecretCredential";

    /// Creates the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] for an invalid tenant, an empty
    /// client id or secret, or an invalid authority host.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        secret: SecretString,
        options: ClientOptions,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        validate_tenant_id(&tenant_id)?;
        if client_id.trim().is_empty() {
            return Err(AuthError::misconfigured("client id must not be empty"));
        }
        if secret.expose_secret().is_empty() {
            return Err(AuthError::misconfigured("client secret must not be empty"));
        }
        Ok(Self {
            tenant_id,
            client_id,
            secret,
            authority: AuthorityClient::new(options.authority_host.as_deref())?,
            cache: TokenCache::new(options.additionally_allowed_tenants.clone()),
            additionally_allowed_tenants: options.additionally_allowed_tenants,
        })
    }
}

#[async_trait]
impl CredentialSource for ClientSecretCredential {
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

        cached_or_acquire(&self.cache, &scoped, || async {
            let scope = join_scopes(ctx.scopes());
            let mut form = vec![
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.secret.expose_secret()),
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

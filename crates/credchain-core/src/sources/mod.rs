// SPDX-License-Identifier: Apache-2.0

//! Credential sources shipped with the default chain.
//!
//! Every source implements [`CredentialSource`](crate::CredentialSource) and
//! reports "does not apply here" as [`AuthError::Unavailable`], so it can sit
//! anywhere in a [`ChainedCredential`](crate::ChainedCredential).

mod authority;
mod azure_cli;
mod azure_developer_cli;
mod client_assertion;
mod client_secret;
mod device_code;
mod environment;
mod ide;
mod managed_identity;
mod process;
mod username_password;
mod workload_identity;

use std::future::Future;
use std::time::Duration;

use tracing::debug;

pub use authority::DEFAULT_AUTHORITY_HOST;
pub use azure_cli::AzureCliCredential;
pub use azure_developer_cli::AzureDeveloperCliCredential;
pub use client_assertion::{AssertionProvider, ClientAssertionCredential};
pub use client_secret::ClientSecretCredential;
pub use device_code::{DeviceCodeCredential, DeviceCodeInfo, DeviceCodePrompt};
pub use environment::EnvironmentCredential;
pub use ide::{IdeCredential, IdeSignIn};
pub use managed_identity::{IMDS_ENDPOINT, ManagedIdentityCredential, ManagedIdentityId};
pub use process::DEFAULT_PROCESS_TIMEOUT;
pub use username_password::UsernamePasswordCredential;
pub use workload_identity::WorkloadIdentityCredential;

use self::authority::AuthorityClient;
use crate::cache::{CachedAccount, TokenCache};
use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::token::AccessToken;

/// Options shared by sources that talk to the authority directly.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Authority host; defaults to [`DEFAULT_AUTHORITY_HOST`].
    pub authority_host: Option<String>,
    /// Tenants the source may also acquire tokens for; `*` allows any.
    pub additionally_allowed_tenants: Vec<String>,
}

/// Options shared by the developer CLI sources.
#[derive(Debug, Clone)]
pub struct DeveloperCliOptions {
    /// Tenant to request tokens from; the CLI's signed-in tenant when `None`.
    pub tenant_id: Option<String>,
    /// Tenants the source may also acquire tokens for; `*` allows any.
    pub additionally_allowed_tenants: Vec<String>,
    /// Time the CLI may take before the source reports itself unavailable.
    pub timeout: Duration,
}

impl Default for DeveloperCliOptions {
    fn default() -> Self {
        Self {
            tenant_id: None,
            additionally_allowed_tenants: Vec::new(),
            timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }
}

/// Serves `ctx` from `cache` when possible, otherwise runs `acquire` and
/// stores its result.
pub(crate) async fn cached_or_acquire<F, Fut>(
    cache: &TokenCache,
    ctx: &TokenRequestContext,
    acquire: F,
) -> Result<AccessToken, AuthError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(AccessToken, CachedAccount), AuthError>>,
{
    if let Some(token) = cache.silent_token(ctx).await {
        return Ok(token);
    }
    let (token, account) = acquire().await?;
    cache.update(&token, account, ctx).await;
    Ok(token)
}

/// Redeems the cached account's refresh token, if any.
///
/// Failures are logged and swallowed; the caller falls back to its
/// interactive or credential-based flow.
pub(crate) async fn refresh_silently(
    cache: &TokenCache,
    authority: &AuthorityClient,
    tenant_id: &str,
    client_id: &str,
    ctx: &TokenRequestContext,
) -> Option<AccessToken> {
    if !cache.is_populated(ctx).await {
        return None;
    }
    let account = cache.cached_account().await?;
    let refresh_token = account.refresh_token()?.clone();

    match authority
        .redeem_refresh_token(tenant_id, client_id, &refresh_token, ctx)
        .await
    {
        Ok(mut response) => {
            let rotated = response.take_refresh_token().unwrap_or(refresh_token);
            let token = response.into_access_token();
            let mut refreshed =
                CachedAccount::new(account.account_id(), Some(tenant_id.to_string()))
                    .with_refresh_token(rotated);
            if let Some(username) = account.username() {
                refreshed = refreshed.with_username(username);
            }
            cache.update(&token, refreshed, ctx).await;
            debug!("Redeemed cached refresh token");
            Some(token)
        }
        Err(err) => {
            debug!(error = %err, "Silent refresh failed");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{Duration, Utc};

    use super::*;

    #[tokio::test]
    async fn test_cached_or_acquire_only_acquires_once() {
        let cache = TokenCache::default();
        let ctx = TokenRequestContext::for_scopes(["a"]);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            cached_or_acquire(&cache, &ctx, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((
                    AccessToken::new("t", Utc::now() + Duration::hours(1)),
                    CachedAccount::new("acct", None),
                ))
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_or_acquire_does_not_cache_failures() {
        let cache = TokenCache::default();
        let ctx = TokenRequestContext::for_scopes(["a"]);

        let err = cached_or_acquire(&cache, &ctx, || async {
            Err(AuthError::unavailable("nope"))
        })
        .await
        .unwrap_err();

        assert!(err.is_unavailable());
        assert!(cache.cached_account().await.is_none());
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Per-credential token cache for silent reuse.
//!
//! Each credential owns one [`TokenCache`] holding the last token it acquired
//! and the account that produced it. The lock is only held to copy a slot in
//! or out, never across network or subprocess I/O, so concurrent callers on
//! other tenants proceed with their own acquisition without waiting.

use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::context::TokenRequestContext;
use crate::tenant::is_additionally_allowed;
use crate::token::AccessToken;

/// Identity that produced a cached token.
#[derive(Debug, Clone)]
pub struct CachedAccount {
    account_id: String,
    username: Option<String>,
    tenant_id: Option<String>,
    scopes: Vec<String>,
    refresh_token: Option<SecretString>,
}

impl CachedAccount {
    /// Account with the given opaque id, issued in `tenant_id`.
    pub fn new(account_id: impl Into<String>, tenant_id: Option<String>) -> Self {
        Self {
            account_id: account_id.into(),
            username: None,
            tenant_id,
            scopes: Vec::new(),
            refresh_token: None,
        }
    }

    /// Attach the signed-in user name.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Attach a refresh token for public-client silent reuse.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: SecretString) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Opaque account identity.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Signed-in user name, if known.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Tenant the account was last proven valid for.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Scopes the account was last proven valid for.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Refresh token, for public-client flows.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }
}

#[derive(Debug)]
struct CacheSlot {
    account: CachedAccount,
    token: AccessToken,
    /// Tenant the request that filled the slot targeted; `None` means the
    /// source's default.
    requested_tenant: Option<String>,
}

/// Last token and account acquired by one credential instance.
#[derive(Debug, Default)]
pub struct TokenCache {
    additionally_allowed_tenants: Vec<String>,
    slot: RwLock<Option<CacheSlot>>,
}

impl TokenCache {
    /// Empty cache; `additionally_allowed_tenants` widens tenant compatibility.
    #[must_use]
    pub fn new(additionally_allowed_tenants: Vec<String>) -> Self {
        Self {
            additionally_allowed_tenants,
            slot: RwLock::new(None),
        }
    }

    /// `true` if a cached account exists and may serve `ctx`'s tenant.
    pub async fn is_populated(&self, ctx: &TokenRequestContext) -> bool {
        self.slot
            .read()
            .await
            .as_ref()
            .is_some_and(|slot| self.tenant_compatible(&slot.account, ctx))
    }

    /// The cached account, if any.
    pub async fn cached_account(&self) -> Option<CachedAccount> {
        self.slot.read().await.as_ref().map(|s| s.account.clone())
    }

    /// A cached token that can be handed back without any I/O.
    ///
    /// Requires the request to target the same tenant as the request that
    /// filled the cache (both unset, or equal), every requested scope among
    /// the cached ones, no claims challenge, and a token that does not need
    /// refresh.
    #[instrument(skip_all)]
    pub async fn silent_token(&self, ctx: &TokenRequestContext) -> Option<AccessToken> {
        if ctx.requires_reauthentication() {
            debug!("Claims challenge present, bypassing cache");
            return None;
        }
        let guard = self.slot.read().await;
        let slot = guard.as_ref()?;

        let same_tenant = match (ctx.tenant_id(), slot.requested_tenant.as_deref()) {
            (None, None) => true,
            (Some(requested), Some(cached)) => requested.eq_ignore_ascii_case(cached),
            _ => false,
        };
        let covers_scopes = ctx
            .scopes()
            .iter()
            .all(|s| slot.account.scopes.contains(s));

        if same_tenant && covers_scopes && !slot.token.needs_refresh() {
            debug!("Serving token from cache");
            Some(slot.token.clone())
        } else {
            None
        }
    }

    /// Overwrites the cached account and token.
    ///
    /// Concurrent updates race; the last writer wins.
    pub async fn update(
        &self,
        token: &AccessToken,
        mut account: CachedAccount,
        ctx: &TokenRequestContext,
    ) {
        account.scopes = ctx.scopes().to_vec();
        *self.slot.write().await = Some(CacheSlot {
            account,
            token: token.clone(),
            requested_tenant: ctx.tenant_id().map(str::to_string),
        });
    }

    fn tenant_compatible(&self, account: &CachedAccount, ctx: &TokenRequestContext) -> bool {
        let Some(requested) = ctx.tenant_id() else {
            return true;
        };
        match account.tenant_id() {
            Some(cached) if cached.eq_ignore_ascii_case(requested) => true,
            _ => is_additionally_allowed(requested, &self.additionally_allowed_tenants),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! The credential source contract.
//!
//! A [`CredentialSource`] is one authentication mechanism. The chain treats
//! every source as an opaque token producer and only looks at the tag of the
//! [`AuthError`] it returns.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::token::AccessToken;

/// One mechanism capable of producing an access token.
///
/// Implementations validate their configuration when constructed and return
/// [`AuthError::Misconfigured`] from the constructor rather than from
/// [`acquire`](CredentialSource::acquire), except where configuration is only
/// known at call time.
///
/// Most implementations follow a two-step pattern: try silent reuse through
/// their [`TokenCache`](crate::TokenCache), suppressing any failure, then run
/// the full acquisition flow and update the cache on success.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Type name used in diagnostics (e.g., `EnvironmentCredential`).
    fn name(&self) -> &str;

    /// Acquires a token for `ctx`.
    ///
    /// On success the token has not expired. On failure the error is tagged
    /// [`AuthError::Unavailable`] when the mechanism does not apply here, and
    /// otherwise describes why the attempt failed.
    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError>;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        (**self).acquire(ctx).await
    }
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        (**self).acquire(ctx).await
    }
}

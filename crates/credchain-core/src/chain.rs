// SPDX-License-Identifier: Apache-2.0

//! Ordered credential chain with optional pinning of the working source.
//!
//! [`ChainedCredential::get_token`] runs this state machine:
//! 1. **Pinned** (reuse enabled and a source succeeded before): ask that source
//!    alone. Success ends the call; failure falls through to a full walk.
//! 2. **Walk**: ask every source from index 0 in declared order. The first
//!    success is pinned and returned. Unavailable and failed sources are
//!    recorded and skipped. A fatal error aborts the call.
//! 3. **Exhausted**: fold every recorded failure into one
//!    [`AggregatedUnavailableError`].
//!
//! The pin is a single atomic word. Concurrent callers may race to write it;
//! every write stores the index of a source that just succeeded, so any
//! interleaving leaves a valid pin.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::classify::ErrorKind;
use crate::context::TokenRequestContext;
use crate::error::{AggregatedUnavailableError, AuthError, ChainError, SourceFailure};
use crate::source::CredentialSource;
use crate::token::AccessToken;

/// Sentinel for "no source pinned".
const NO_PIN: usize = usize::MAX;

/// Default diagnostic name of a chain.
pub const CHAINED_CREDENTIAL: &str = "ChainedCredential";

/// Tries credential sources in order until one produces a token.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use credchain_core::{ChainedCredential, CredentialSource, TokenRequestContext};
/// use credchain_core::sources::{AzureCliCredential, EnvironmentCredential};
///
/// # async fn example() -> anyhow::Result<()> {
/// let sources: Vec<Arc<dyn CredentialSource>> = vec![
///     Arc::new(EnvironmentCredential::from_process()),
///     Arc::new(AzureCliCredential::new()),
/// ];
/// let chain = ChainedCredential::new(sources)?.with_reuse_on_success(true);
///
/// let ctx = TokenRequestContext::for_scopes(["https://management.azure.com/.default"]);
/// let token = chain.get_token(&ctx).await?;
/// println!("expires on {}", token.expires_on());
/// # Ok(())
/// # }
/// ```
pub struct ChainedCredential {
    name: String,
    sources: Vec<Arc<dyn CredentialSource>>,
    pinned: AtomicUsize,
    reuse_on_success: bool,
}

impl ChainedCredential {
    /// Chain over `sources` in the given order, with pin reuse disabled.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] if `sources` is empty.
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>) -> Result<Self, AuthError> {
        if sources.is_empty() {
            return Err(AuthError::misconfigured(
                "a credential chain requires at least one credential source",
            ));
        }
        Ok(Self {
            name: CHAINED_CREDENTIAL.to_string(),
            sources,
            pinned: AtomicUsize::new(NO_PIN),
            reuse_on_success: false,
        })
    }

    /// Skip straight to the last successful source on later calls.
    #[must_use]
    pub fn with_reuse_on_success(mut self, reuse: bool) -> Self {
        self.reuse_on_success = reuse;
        self
    }

    /// Rename the chain in diagnostics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether pinned-source reuse is enabled.
    #[must_use]
    pub fn reuse_on_success(&self) -> bool {
        self.reuse_on_success
    }

    /// Source names in declared order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Name of the source that last succeeded, if any.
    #[must_use]
    pub fn pinned_source(&self) -> Option<&str> {
        self.pinned_index()
            .and_then(|i| self.sources.get(i))
            .map(|s| s.name())
    }

    fn pinned_index(&self) -> Option<usize> {
        match self.pinned.load(Ordering::Acquire) {
            NO_PIN => None,
            index => Some(index),
        }
    }

    /// Acquires a token from the first source that can produce one.
    ///
    /// # Errors
    ///
    /// - [`ChainError::Aborted`] if the request is invalid or a source
    ///   reported a fatal misconfiguration. Remaining sources are not tried.
    /// - [`ChainError::Exhausted`] if every source failed.
    #[instrument(skip_all, fields(chain = %self.name, scopes = ?ctx.scopes()))]
    pub async fn get_token(&self, ctx: &TokenRequestContext) -> Result<AccessToken, ChainError> {
        if let Err(err) = ctx.validate() {
            error!(error = %err, "Rejecting token request before trying any credential");
            return Err(ChainError::Aborted {
                credential: self.name.clone(),
                source: err,
            });
        }

        let mut failures: Option<SourceFailure> = None;
        let mut already_tried = None;

        if self.reuse_on_success
            && let Some(index) = self.pinned_index()
            && let Some(source) = self.sources.get(index)
        {
            match attempt(source.as_ref(), ctx).await {
                Ok(token) => {
                    debug!(credential = source.name(), "Pinned credential returned a token");
                    return Ok(token);
                }
                Err(err) => {
                    log_failure(source.as_ref(), &err);
                    if err.is_fatal() {
                        return Err(abort(source.as_ref(), err));
                    }
                    debug!(
                        credential = source.name(),
                        "Pinned credential failed, walking the full chain"
                    );
                    // Only clear the pin if no concurrent caller has repinned.
                    let _ = self.pinned.compare_exchange(
                        index,
                        NO_PIN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    failures = Some(SourceFailure::new(source.name(), err, None));
                    already_tried = Some(index);
                }
            }
        }

        for (index, source) in self.sources.iter().enumerate() {
            if already_tried == Some(index) {
                continue;
            }
            match attempt(source.as_ref(), ctx).await {
                Ok(token) => {
                    self.pinned.store(index, Ordering::Release);
                    info!(credential = source.name(), "Acquired token");
                    return Ok(token);
                }
                Err(err) => {
                    log_failure(source.as_ref(), &err);
                    if err.is_fatal() {
                        return Err(abort(source.as_ref(), err));
                    }
                    failures = Some(SourceFailure::new(source.name(), err, failures.take()));
                }
            }
        }

        // `new` rejects empty chains and every non-fatal failure above is
        // recorded, so a walk that falls through always has a failure.
        let Some(last) = failures else {
            return Err(ChainError::Aborted {
                credential: self.name.clone(),
                source: AuthError::misconfigured("credential chain has no sources"),
            });
        };
        let exhausted = AggregatedUnavailableError::new(self.name.clone(), last);
        debug!(attempts = exhausted.len(), "Credential chain exhausted");
        Err(ChainError::Exhausted(exhausted))
    }
}

/// Logs a source failure at the level its kind calls for.
fn log_failure(source: &dyn CredentialSource, err: &AuthError) {
    match err.kind() {
        ErrorKind::Unavailable => {
            debug!(credential = source.name(), reason = %err, "Credential unavailable");
        }
        ErrorKind::AuthenticationFailed => {
            warn!(credential = source.name(), error = %err, "Credential failed to authenticate");
        }
        ErrorKind::Fatal => {
            error!(credential = source.name(), error = %err, "Aborting credential chain");
        }
    }
}

/// Calls one source and rejects tokens that are already expired.
async fn attempt(
    source: &dyn CredentialSource,
    ctx: &TokenRequestContext,
) -> Result<AccessToken, AuthError> {
    let token = source.acquire(ctx).await?;
    if token.is_expired() {
        return Err(AuthError::authentication_failed(
            "returned a token that has already expired",
        ));
    }
    Ok(token)
}

fn abort(source: &dyn CredentialSource, err: AuthError) -> ChainError {
    ChainError::Aborted {
        credential: source.name().to_string(),
        source: err,
    }
}

impl fmt::Debug for ChainedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedCredential")
            .field("name", &self.name)
            .field("sources", &self.source_names())
            .field("pinned", &self.pinned_source())
            .field("reuse_on_success", &self.reuse_on_success)
            .finish()
    }
}

#[async_trait]
impl CredentialSource for ChainedCredential {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        match self.get_token(ctx).await {
            Ok(token) => Ok(token),
            Err(ChainError::Exhausted(exhausted)) => Err(AuthError::Chain(exhausted)),
            Err(ChainError::Aborted { source, .. }) => Err(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use chrono::{Duration, Utc};
    use secrecy::ExposeSecret;
    use tracing_test::traced_test;

    use super::*;

    enum Behavior {
        Succeed(&'static str),
        Unavailable,
        Fail,
        Fatal,
        Expired,
    }

    struct Scripted {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn acquire(&self, _ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed(t) => Ok(AccessToken::new(t, Utc::now() + Duration::hours(1))),
                Behavior::Unavailable => Err(AuthError::unavailable("not here")),
                Behavior::Fail => Err(AuthError::authentication_failed("rejected")),
                Behavior::Fatal => Err(AuthError::misconfigured("contradictory settings")),
                Behavior::Expired => Ok(AccessToken::new("old", Utc::now() - Duration::hours(1))),
            }
        }
    }

    fn ctx() -> TokenRequestContext {
        TokenRequestContext::for_scopes(["https://management.azure.com/.default"])
    }

    fn chain(sources: &[Arc<Scripted>]) -> ChainedCredential {
        let sources = sources
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn CredentialSource>)
            .collect();
        ChainedCredential::new(sources).expect("non-empty chain")
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let err = ChainedCredential::new(vec![]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_fatal_source_aborts_chain() {
        let a = Scripted::new("A", Behavior::Unavailable);
        let b = Scripted::new("B", Behavior::Fatal);
        let c = Scripted::new("C", Behavior::Succeed("c"));
        let chain = chain(&[a.clone(), b.clone(), c.clone()]);

        let err = chain.get_token(&ctx()).await.unwrap_err();
        match err {
            ChainError::Aborted { credential, source } => {
                assert_eq!(credential, "B");
                assert!(source.is_fatal());
            }
            ChainError::Exhausted(_) => panic!("expected abort"),
        }
        assert_eq!(c.calls(), 0);
        assert_eq!(chain.pinned_source(), None);
    }

    #[tokio::test]
    async fn test_expired_token_is_treated_as_failure() {
        let a = Scripted::new("A", Behavior::Expired);
        let b = Scripted::new("B", Behavior::Succeed("b"));
        let chain = chain(&[a.clone(), b.clone()]);

        let token = chain.get_token(&ctx()).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "b");
        assert_eq!(chain.pinned_source(), Some("B"));
    }

    #[tokio::test]
    async fn test_pin_is_recorded_without_reuse() {
        let a = Scripted::new("A", Behavior::Unavailable);
        let b = Scripted::new("B", Behavior::Succeed("b"));
        let chain = chain(&[a.clone(), b.clone()]);

        chain.get_token(&ctx()).await.unwrap();
        chain.get_token(&ctx()).await.unwrap();

        assert_eq!(chain.pinned_source(), Some("B"));
        // Reuse disabled: every call walks from the start.
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 2);
    }

    #[tokio::test]
    async fn test_pinned_failure_is_not_retried_in_same_call() {
        let a = Scripted::new("A", Behavior::Unavailable);
        let b = Scripted::new("B", Behavior::Fail);
        let chain = chain(&[a.clone(), b.clone()]).with_reuse_on_success(true);
        chain.pinned.store(1, Ordering::Release);

        let err = chain.get_token(&ctx()).await.unwrap_err();
        let ChainError::Exhausted(exhausted) = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(b.calls(), 1);
        assert_eq!(a.calls(), 1);
        let names: Vec<&str> = exhausted.failures().iter().map(|f| f.credential()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(chain.pinned_source(), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_pinned_authentication_failure_logs_warning() {
        let a = Scripted::new("A", Behavior::Unavailable);
        let b = Scripted::new("B", Behavior::Fail);
        let chain = chain(&[a, b]).with_reuse_on_success(true);
        chain.pinned.store(1, Ordering::Release);

        chain.get_token(&ctx()).await.unwrap_err();

        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| {
                    line.contains("WARN") && line.contains("Credential failed to authenticate")
                })
                .count();
            match warnings {
                1 => Ok(()),
                n => Err(format!("expected one warning for the pinned source, got {n}")),
            }
        });
    }

    #[tokio::test]
    async fn test_nested_chain_unavailable_lets_outer_continue() {
        let inner_a = Scripted::new("InnerA", Behavior::Unavailable);
        let inner = chain(&[inner_a]).with_name("Inner");
        let outer_b = Scripted::new("OuterB", Behavior::Succeed("outer"));
        let outer = ChainedCredential::new(vec![
            Arc::new(inner) as Arc<dyn CredentialSource>,
            outer_b as Arc<dyn CredentialSource>,
        ])
        .unwrap();

        let token = outer.get_token(&ctx()).await.unwrap();
        assert_eq!(token.secret().expose_secret(), "outer");
    }

    #[tokio::test]
    async fn test_debug_lists_sources() {
        let chain = chain(&[Scripted::new("A", Behavior::Unavailable)]).with_name("Custom");
        let debug = format!("{chain:?}");
        assert!(debug.contains("Custom"));
        assert!(debug.contains("\"A\""));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Token request context.
//!
//! A [`TokenRequestContext`] is built fresh by the caller for every token
//! request and is never mutated afterwards.
//!
//! # Examples
//!
//! ```
//! use credchain_core::TokenRequestContext;
//!
//! let ctx = TokenRequestContext::builder()
//!     .scopes(vec!["https://management.azure.com/.default".to_string()])
//!     .tenant_id("contoso.onmicrosoft.com")
//!     .build();
//!
//! assert!(ctx.validate().is_ok());
//! assert_eq!(ctx.tenant_id(), Some("contoso.onmicrosoft.com"));
//! ```

use bon::Builder;

use crate::error::AuthError;
use crate::tenant::validate_tenant_id;

/// Suffix of a scope that requests every statically configured permission.
const DEFAULT_SUFFIX: &str = "/.default";

/// Scopes, tenant, and claims challenge for one token request.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct TokenRequestContext {
    /// Requested scopes; at least one is required.
    scopes: Vec<String>,

    /// Tenant to request the token from, overriding the source's default.
    #[builder(into)]
    tenant_id: Option<String>,

    /// Claims challenge returned by a resource; forces re-authentication.
    #[builder(into)]
    claims: Option<String>,
}

impl TokenRequestContext {
    /// Context for the given scopes with no tenant override or claims.
    pub fn for_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            tenant_id: None,
            claims: None,
        }
    }

    /// Requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Tenant override, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Claims challenge, if any.
    #[must_use]
    pub fn claims(&self) -> Option<&str> {
        self.claims.as_deref()
    }

    /// Copy of this context that targets `tenant_id` instead.
    #[must_use]
    pub fn retarget(&self, tenant_id: Option<String>) -> Self {
        Self {
            tenant_id,
            ..self.clone()
        }
    }

    /// `true` when a claims challenge forbids serving a cached token.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        self.claims.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Validates the context before any source is asked for a token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRequest`] if there are no scopes, a scope
    /// contains characters outside `[A-Za-z0-9.-_:/]`, or the tenant id is
    /// malformed.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.scopes.is_empty() {
            return Err(AuthError::invalid_request(
                "at least one scope must be specified",
            ));
        }
        for scope in &self.scopes {
            validate_scope(scope)?;
        }
        if let Some(tenant) = self.tenant_id.as_deref()
            && validate_tenant_id(tenant).is_err()
        {
            return Err(AuthError::invalid_request(format!(
                "invalid tenant id '{tenant}' in token request"
            )));
        }
        Ok(())
    }

    /// The single scope of this request, as required by resource-based
    /// mechanisms (managed identity, Azure CLI).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AuthenticationFailed`] if more than one scope was
    /// requested.
    pub fn single_scope(&self, credential: &str) -> Result<&str, AuthError> {
        match self.scopes.as_slice() {
            [scope] => Ok(scope),
            [] => Err(AuthError::invalid_request(
                "at least one scope must be specified",
            )),
            _ => Err(AuthError::authentication_failed(format!(
                "{credential} only supports a single scope per request"
            ))),
        }
    }
}

/// Checks that a scope is safe to pass on a command line.
///
/// # Errors
///
/// Returns [`AuthError::InvalidRequest`] naming the offending scope.
pub fn validate_scope(scope: &str) -> Result<(), AuthError> {
    let valid = !scope.is_empty()
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '/'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::invalid_request(format!(
            "invalid scope '{scope}'; only alphanumeric characters and . - _ : / are allowed"
        )))
    }
}

/// Converts a scope to the resource URI expected by resource-based endpoints.
///
/// `https://vault.azure.net/.default` becomes `https://vault.azure.net`; other
/// scopes are returned unchanged.
#[must_use]
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix(DEFAULT_SUFFIX).unwrap_or(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_all_fields() {
        let ctx = TokenRequestContext::builder()
            .scopes(vec!["https://storage.azure.com/.default".to_string()])
            .tenant_id("tenant-a")
            .claims("{\"access_token\":{}}")
            .build();

        assert_eq!(ctx.scopes(), ["https://storage.azure.com/.default"]);
        assert_eq!(ctx.tenant_id(), Some("tenant-a"));
        assert!(ctx.requires_reauthentication());
    }

    #[test]
    fn test_for_scopes_has_no_tenant_or_claims() {
        let ctx = TokenRequestContext::for_scopes(["scope-a"]);
        assert_eq!(ctx.tenant_id(), None);
        assert_eq!(ctx.claims(), None);
        assert!(!ctx.requires_reauthentication());
    }

    #[test]
    fn test_empty_claims_do_not_force_reauthentication() {
        let ctx = TokenRequestContext::builder()
            .scopes(vec!["scope-a".to_string()])
            .claims("")
            .build();
        assert!(!ctx.requires_reauthentication());
    }

    #[test]
    fn test_retarget_keeps_scopes_and_claims() {
        let ctx = TokenRequestContext::builder()
            .scopes(vec!["scope-a".to_string()])
            .claims("c")
            .build();
        let retargeted = ctx.retarget(Some("tenant-b".to_string()));
        assert_eq!(retargeted.tenant_id(), Some("tenant-b"));
        assert_eq!(retargeted.scopes(), ctx.scopes());
        assert_eq!(retargeted.claims(), Some("c"));
        assert_eq!(ctx.tenant_id(), None);
    }

    #[test]
    fn test_validate_rejects_empty_scopes() {
        let ctx = TokenRequestContext::for_scopes(Vec::<String>::new());
        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[test]
    fn test_validate_rejects_shell_metacharacters() {
        let ctx = TokenRequestContext::for_scopes(["https://x/.default; rm -rf /"]);
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_tenant() {
        let ctx = TokenRequestContext::builder()
            .scopes(vec!["https://vault.azure.net/.default".to_string()])
            .tenant_id("bad tenant")
            .build();
        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        assert!(err.to_string().contains("bad tenant"));
    }

    #[test]
    fn test_validate_accepts_common_scopes() {
        let ctx = TokenRequestContext::for_scopes([
            "https://management.azure.com/.default",
            "api://my-app_v2/user.read",
        ]);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_single_scope() {
        let ctx = TokenRequestContext::for_scopes(["a"]);
        assert_eq!(ctx.single_scope("Test").unwrap(), "a");

        let multi = TokenRequestContext::for_scopes(["a", "b"]);
        let err = multi.single_scope("ManagedIdentityCredential").unwrap_err();
        assert!(err.to_string().contains("single scope"));
    }

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(
            scope_to_resource("https://vault.azure.net/.default"),
            "https://vault.azure.net"
        );
        assert_eq!(scope_to_resource("api://app/read"), "api://app/read");
    }
}

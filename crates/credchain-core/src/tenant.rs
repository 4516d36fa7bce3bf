// SPDX-License-Identifier: Apache-2.0

//! Tenant validation and per-request tenant resolution.
//!
//! A credential configured for tenant A only acquires tokens for tenant B when
//! B is listed in its additionally allowed tenants, or the list contains `*`.

use crate::context::TokenRequestContext;
use crate::error::AuthError;

/// Allows every tenant when present in the additionally allowed list.
pub const ANY_TENANT: &str = "*";

/// Tenant id used by AD FS authorities, which never switch tenants.
const ADFS_TENANT: &str = "adfs";

/// Checks a tenant id before it is used in a URL or on a command line.
///
/// # Errors
///
/// Returns [`AuthError::Misconfigured`] if the tenant is empty or contains
/// characters other than alphanumerics, `.` and `-`.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), AuthError> {
    let valid = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::misconfigured(format!(
            "invalid tenant id '{tenant_id}'; only alphanumeric characters, '.' and '-' are allowed"
        )))
    }
}

/// `true` if `allowed` permits switching to `tenant`.
#[must_use]
pub fn is_additionally_allowed(tenant: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|t| t == ANY_TENANT || t.eq_ignore_ascii_case(tenant))
}

/// Picks the tenant for one request.
///
/// Returns the request's tenant when it may be used, the configured default
/// when the request names none, and `None` when neither is known (CLI tools
/// then use their own signed-in tenant).
///
/// # Errors
///
/// Returns [`AuthError::AuthenticationFailed`] when the request names a tenant
/// the credential is not allowed to switch to, and
/// [`AuthError::InvalidRequest`] when the request tenant is malformed.
pub fn resolve_tenant(
    credential: &str,
    default_tenant: Option<&str>,
    ctx: &TokenRequestContext,
    additionally_allowed: &[String],
) -> Result<Option<String>, AuthError> {
    let Some(requested) = ctx.tenant_id() else {
        return Ok(default_tenant.map(str::to_string));
    };
    if validate_tenant_id(requested).is_err() {
        return Err(AuthError::invalid_request(format!(
            "invalid tenant id '{requested}' in token request"
        )));
    }

    match default_tenant {
        None => Ok(Some(requested.to_string())),
        Some(current) if current.eq_ignore_ascii_case(ADFS_TENANT) => {
            Ok(Some(current.to_string()))
        }
        Some(current) if current.eq_ignore_ascii_case(requested) => {
            Ok(Some(current.to_string()))
        }
        Some(_) if is_additionally_allowed(requested, additionally_allowed) => {
            Ok(Some(requested.to_string()))
        }
        Some(_) => Err(AuthError::authentication_failed(format!(
            "{credential} is not configured to acquire tokens for tenant '{requested}'. \
             To enable acquiring tokens for this tenant add it to the additionally allowed \
             tenants, or add \"*\" to allow any tenant."
        ))),
    }
}

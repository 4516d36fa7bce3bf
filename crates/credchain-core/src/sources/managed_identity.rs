// SPDX-License-Identifier: Apache-2.0

//! Managed identity for Azure-hosted workloads.
//!
//! Two hosting environments are recognised:
//! - App Service and Functions, through `IDENTITY_ENDPOINT` and
//!   `IDENTITY_HEADER`.
//! - Everything else (VMs, scale sets, AKS), through the instance metadata
//!   service (IMDS) at a link-local address.
//!
//! Both endpoints take a resource rather than scopes, so only single-scope
//! requests are supported.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::authority::{optional_seconds, seconds};
use super::cached_or_acquire;
use crate::cache::{CachedAccount, TokenCache};
use crate::context::{TokenRequestContext, scope_to_resource};
use crate::env::{AZURE_POD_IDENTITY_AUTHORITY_HOST, EnvVars, IDENTITY_ENDPOINT, IDENTITY_HEADER};
use crate::error::AuthError;
use crate::retry::{DEFAULT_MAX_RETRIES, is_retryable, retry_backoff};
use crate::source::CredentialSource;
use crate::token::AccessToken;

/// Instance metadata service token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_PATH: &str = "/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// A missing endpoint fails fast instead of waiting for the request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which managed identity to authenticate as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ManagedIdentityId {
    /// The resource's system-assigned identity.
    #[default]
    SystemAssigned,
    /// A user-assigned identity, by client id.
    ClientId(String),
    /// A user-assigned identity, by Azure resource id.
    ResourceId(String),
}

impl ManagedIdentityId {
    /// Builds the identity from optional client id and resource id settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] if both are set.
    pub fn from_options(
        client_id: Option<String>,
        resource_id: Option<String>,
    ) -> Result<Self, AuthError> {
        match (client_id, resource_id) {
            (Some(_), Some(_)) => Err(AuthError::misconfigured(
                "a managed identity client id and resource id cannot both be specified",
            )),
            (Some(client_id), None) => Ok(Self::ClientId(client_id)),
            (None, Some(resource_id)) => Ok(Self::ResourceId(resource_id)),
            (None, None) => Ok(Self::SystemAssigned),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::SystemAssigned => "system-assigned",
            Self::ClientId(id) | Self::ResourceId(id) => id,
        }
    }
}

enum Endpoint {
    AppService { url: String, secret: SecretString },
    Imds { url: String },
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppService { url, .. } => {
                f.debug_struct("AppService").field("url", url).finish_non_exhaustive()
            }
            Self::Imds { url } => f.debug_struct("Imds").field("url", url).finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    /// Unix seconds; sent as a string by both endpoints.
    #[serde(deserialize_with = "seconds")]
    expires_on: i64,
    #[serde(default, deserialize_with = "optional_seconds")]
    refresh_in: Option<i64>,
}

impl ManagedIdentityToken {
    fn into_access_token(self) -> Result<AccessToken, AuthError> {
        let expires_on = chrono::DateTime::from_timestamp(self.expires_on, 0).ok_or_else(|| {
            AuthError::authentication_failed("managed identity returned an invalid expiry")
        })?;
        let mut token = AccessToken::new(self.access_token, expires_on);
        if let Some(token_type) = self.token_type {
            token = token.with_token_type(token_type);
        }
        if let Some(refresh_in) = self.refresh_in {
            token = token.with_refresh_on(Utc::now() + chrono::Duration::seconds(refresh_in));
        }
        Ok(token)
    }
}

/// Authenticates as the managed identity of the hosting Azure resource.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    id: ManagedIdentityId,
    endpoint: Endpoint,
    http: reqwest::Client,
    max_retries: usize,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    /// Diagnostic name.
    pub const NAME: &'static str = "ManagedIdentityCredential";

    /// System-assigned identity, endpoint detected from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, AuthError> {
        Self::from_env(
            &EnvVars::from_process(),
            ManagedIdentityId::SystemAssigned,
            DEFAULT_MAX_RETRIES,
        )
    }

    /// Detects the endpoint from `env`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn from_env(
        env: &EnvVars,
        id: ManagedIdentityId,
        max_retries: usize,
    ) -> Result<Self, AuthError> {
        let endpoint = match (env.get(IDENTITY_ENDPOINT), env.get(IDENTITY_HEADER)) {
            (Some(url), Some(secret)) => Endpoint::AppService {
                url: url.to_string(),
                secret: SecretString::from(secret),
            },
            _ => Endpoint::Imds {
                url: env
                    .get(AZURE_POD_IDENTITY_AUTHORITY_HOST)
                    .map_or_else(
                        || IMDS_ENDPOINT.to_string(),
                        |host| format!("{}{IMDS_PATH}", host.trim_end_matches('/')),
                    ),
            },
        };
        Self::with_endpoint(id, endpoint, max_retries)
    }

    /// Uses the instance metadata service at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn imds(
        url: impl Into<String>,
        id: ManagedIdentityId,
        max_retries: usize,
    ) -> Result<Self, AuthError> {
        Self::with_endpoint(id, Endpoint::Imds { url: url.into() }, max_retries)
    }

    fn with_endpoint(
        id: ManagedIdentityId,
        endpoint: Endpoint,
        max_retries: usize,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            id,
            endpoint,
            http,
            max_retries,
            cache: TokenCache::default(),
        })
    }

    /// The identity this credential authenticates as.
    #[must_use]
    pub fn identity(&self) -> &ManagedIdentityId {
        &self.id
    }

    fn build_request(&self, resource: &str) -> reqwest::RequestBuilder {
        let (request, id_param) = match &self.endpoint {
            Endpoint::AppService { url, secret } => (
                self.http
                    .get(url)
                    .header("X-IDENTITY-HEADER", secret.expose_secret())
                    .query(&[("api-version", APP_SERVICE_API_VERSION), ("resource", resource)]),
                "mi_res_id",
            ),
            Endpoint::Imds { url } => (
                self.http
                    .get(url)
                    .header("Metadata", "true")
                    .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)]),
                "msi_res_id",
            ),
        };
        match &self.id {
            ManagedIdentityId::SystemAssigned => request,
            ManagedIdentityId::ClientId(client_id) => request.query(&[("client_id", client_id)]),
            ManagedIdentityId::ResourceId(resource_id) => request.query(&[(id_param, resource_id)]),
        }
    }

    async fn request_once(&self, resource: &str) -> Result<AccessToken, AuthError> {
        let response = match self.build_request(resource).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                debug!(error = %err, "Managed identity endpoint unreachable");
                return Err(AuthError::unavailable("No managed identity endpoint found."));
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status().as_u16();
        let body = response.text().await?;
        match status {
            200..=299 => serde_json::from_str::<ManagedIdentityToken>(&body)
                .map_err(AuthError::InvalidResponse)?
                .into_access_token(),
            400 if matches!(self.endpoint, Endpoint::Imds { .. }) => Err(AuthError::unavailable(
                format!("The requested identity has not been assigned to this resource. {body}"),
            )),
            403 if body.contains("unreachable") => Err(AuthError::unavailable(format!(
                "The managed identity endpoint is unreachable. {body}"
            ))),
            _ => Err(AuthError::AuthenticationFailed {
                message: format!("managed identity endpoint returned HTTP {status}: {body}"),
                status: Some(status),
            }),
        }
    }
}

#[async_trait]
impl CredentialSource for ManagedIdentityCredential {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &TokenRequestContext) -> Result<AccessToken, AuthError> {
        let resource = scope_to_resource(ctx.single_scope(Self::NAME)?);
        let scoped = ctx.retarget(None);

        cached_or_acquire(&self.cache, &scoped, || async {
            let token = (|| async { self.request_once(resource).await })
                .retry(retry_backoff(self.max_retries))
                .when(is_retryable)
                .notify(|err, dur| {
                    warn!(
                        error = %err,
                        delay_ms = dur.as_millis(),
                        "Retrying managed identity token request"
                    );
                })
                .await?;
            Ok((token, CachedAccount::new(self.id.label(), None)))
        })
        .await
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Token endpoint client shared by the OAuth2-based sources.

use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::context::TokenRequestContext;
use crate::error::AuthError;
use crate::token::AccessToken;

/// Public cloud authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Extra scopes requested by public clients.
const PUBLIC_CLIENT_SCOPES: &str = "offline_access openid profile";

/// Per-request HTTP timeout for token endpoints.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(deserialize_with = "seconds")]
    expires_in: i64,
    #[serde(default, deserialize_with = "optional_seconds")]
    refresh_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Refresh token issued alongside the access token, if any.
    pub(crate) fn take_refresh_token(&mut self) -> Option<SecretString> {
        self.refresh_token.take().map(SecretString::from)
    }

    pub(crate) fn into_access_token(self) -> AccessToken {
        let now = Utc::now();
        let token = AccessToken::new(
            self.access_token,
            now + chrono::Duration::seconds(self.expires_in),
        )
        .with_token_type(self.token_type);
        match self.refresh_in {
            Some(refresh_in) => token.with_refresh_on(now + chrono::Duration::seconds(refresh_in)),
            None => token,
        }
    }
}

/// OAuth2 error body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OAuthErrorBody {
    #[serde(default)]
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: String,
}

impl OAuthErrorBody {
    pub(crate) fn into_error(self, status: u16) -> AuthError {
        let message = if self.error_description.is_empty() {
            format!("{} (HTTP {status})", self.error)
        } else {
            format!("{}: {}", self.error, self.error_description)
        };
        AuthError::AuthenticationFailed {
            message,
            status: Some(status),
        }
    }
}

/// Outcome of a form POST against the authority.
#[derive(Debug)]
pub(crate) enum FormOutcome {
    Token(TokenResponse),
    Rejected { status: u16, body: OAuthErrorBody },
}

/// HTTP client bound to one authority host.
#[derive(Debug, Clone)]
pub(crate) struct AuthorityClient {
    http: reqwest::Client,
    host: String,
}

impl AuthorityClient {
    /// Client for `host`, or the public cloud when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Misconfigured`] if the host is not an absolute
    /// `http(s)` URL.
    pub(crate) fn new(host: Option<&str>) -> Result<Self, AuthError> {
        let host = host.unwrap_or(DEFAULT_AUTHORITY_HOST).trim_end_matches('/');
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(AuthError::misconfigured(format!(
                "authority host '{host}' must be an absolute https URL"
            )));
        }
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            host: host.to_string(),
        })
    }

    pub(crate) fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{tenant_id}/oauth2/v2.0/token", self.host)
    }

    pub(crate) fn device_code_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{tenant_id}/oauth2/v2.0/devicecode", self.host)
    }

    /// POSTs `form` to `url` and parses either a token or an OAuth2 error.
    #[instrument(skip(self, form), fields(url = %url))]
    pub(crate) async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<FormOutcome, AuthError> {
        let response = self.http.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            let token = serde_json::from_slice(&body).map_err(AuthError::InvalidResponse)?;
            return Ok(FormOutcome::Token(token));
        }
        debug!(status = status.as_u16(), "Authority rejected token request");
        let error = serde_json::from_slice(&body).unwrap_or_else(|_| OAuthErrorBody {
            error: format!("HTTP {}", status.as_u16()),
            error_description: String::from_utf8_lossy(&body).into_owned(),
        });
        Ok(FormOutcome::Rejected {
            status: status.as_u16(),
            body: error,
        })
    }

    /// POSTs `form` to the tenant's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AuthenticationFailed`] carrying the authority's
    /// error description when the request is rejected.
    pub(crate) async fn request_token(
        &self,
        tenant_id: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        match self.post_form(&self.token_endpoint(tenant_id), form).await? {
            FormOutcome::Token(token) => Ok(token),
            FormOutcome::Rejected { status, body } => Err(body.into_error(status)),
        }
    }

    /// Redeems a public-client refresh token for the scopes of `ctx`.
    pub(crate) async fn redeem_refresh_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        refresh_token: &SecretString,
        ctx: &TokenRequestContext,
    ) -> Result<TokenResponse, AuthError> {
        let scope = public_client_scope(ctx.scopes());
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token.expose_secret()),
            ("scope", scope.as_str()),
        ];
        if let Some(claims) = ctx.claims() {
            form.push(("claims", claims));
        }
        self.request_token(tenant_id, &form).await
    }

    /// POSTs `form` to `url` and parses a non-token JSON response.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, AuthError> {
        let response = self.http.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return serde_json::from_slice(&body).map_err(AuthError::InvalidResponse);
        }
        let error: OAuthErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        Err(error.into_error(status.as_u16()))
    }
}

/// Joins scopes for the OAuth2 `scope` form field.
pub(crate) fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Scopes for public-client flows, which also ask for a refresh token.
pub(crate) fn public_client_scope(scopes: &[String]) -> String {
    format!("{} {PUBLIC_CLIENT_SCOPES}", join_scopes(scopes))
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Integer or numeric string; identity endpoints send both.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn parse<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

pub(crate) fn seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?.parse()
}

pub(crate) fn optional_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::parse)
        .transpose()
}

// SPDX-License-Identifier: Apache-2.0

//! Error types for credential acquisition.
//!
//! Uses `thiserror` for deriving `std::error::Error` implementations.
//! Every failure raised by a credential source is an explicit [`AuthError`]
//! variant, so the chain decides "try the next source" or "abort" from data
//! rather than from message inspection. See [`crate::classify`].
//!
//! Application code should use `anyhow::Result` for top-level error handling.

use std::fmt;

use thiserror::Error;

use crate::classify::ErrorKind;

/// Troubleshooting guide appended to exhausted-chain errors.
pub const TROUBLESHOOTING_URL: &str =
    "https://aka.ms/azsdk/identity/default-credential/troubleshoot";

/// Errors raised by a single credential source.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Preconditions for this mechanism are not met in this environment.
    #[error("authentication unavailable. {message}")]
    Unavailable {
        /// Why the mechanism cannot be used here.
        message: String,
    },

    /// The mechanism was attempted and the identity backend rejected it.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message, usually the backend's error description.
        message: String,
        /// HTTP status code from the identity backend, if any.
        status: Option<u16>,
    },

    /// Self-contradictory or incomplete configuration.
    #[error("is misconfigured: {message}")]
    Misconfigured {
        /// Error message.
        message: String,
    },

    /// The token request context is invalid (no scopes, illegal characters).
    #[error("received an invalid token request: {message}")]
    InvalidRequest {
        /// Error message.
        message: String,
    },

    /// Network/HTTP error from reqwest.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A subprocess could not be started or waited on.
    #[error("failed to run `{program}`: {source}")]
    Process {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Token response body could not be parsed.
    #[error("returned an invalid token response")]
    InvalidResponse(#[source] serde_json::Error),

    /// Configuration file or environment could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// A nested credential chain was exhausted.
    #[error(transparent)]
    Chain(#[from] AggregatedUnavailableError),
}

impl AuthError {
    /// Shorthand for [`AuthError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Shorthand for [`AuthError::AuthenticationFailed`] without a status code.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for [`AuthError::Misconfigured`].
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured {
            message: message.into(),
        }
    }

    /// Shorthand for [`AuthError::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Config {
            message: err.to_string(),
        }
    }
}

/// One source's failure within a chain walk.
///
/// Failures are folded as they happen: each new failure owns the one recorded
/// before it, so [`std::error::Error::source`] walks from the newest failure
/// back to the oldest.
#[derive(Debug)]
pub struct SourceFailure {
    credential: String,
    kind: ErrorKind,
    error: AuthError,
    previous: Option<Box<SourceFailure>>,
}

impl SourceFailure {
    pub(crate) fn new(
        credential: impl Into<String>,
        error: AuthError,
        previous: Option<SourceFailure>,
    ) -> Self {
        Self {
            credential: credential.into(),
            kind: error.kind(),
            error,
            previous: previous.map(Box::new),
        }
    }

    /// Type name of the source that produced this failure.
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Classification of the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The underlying error raised by the source.
    #[must_use]
    pub fn error(&self) -> &AuthError {
        &self.error
    }

    /// The failure recorded before this one, if any.
    #[must_use]
    pub fn previous(&self) -> Option<&SourceFailure> {
        self.previous.as_deref()
    }

    /// Writes this failure as one list item; a nested chain's failures follow
    /// as a deeper list.
    fn fmt_item(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.error {
            AuthError::Chain(nested) => {
                writeln!(f, "{indent}- {self}:")?;
                nested.fmt_failures(f, depth + 1)
            }
            _ => writeln!(f, "{indent}- {self}"),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            AuthError::Chain(_) => write!(
                f,
                "{} failed to retrieve a token from the included credentials",
                self.credential
            ),
            error => write!(f, "{} {error}", self.credential),
        }
    }
}

impl std::error::Error for SourceFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.previous
            .as_deref()
            .map(|p| p as &(dyn std::error::Error + 'static))
    }
}

/// Every source in a chain failed.
///
/// Holds the newest failure, which owns all earlier ones. The message lists
/// each source and its reason in call order and ends with a single
/// troubleshooting pointer.
#[derive(Debug)]
pub struct AggregatedUnavailableError {
    chain: String,
    last: Box<SourceFailure>,
    len: usize,
}

impl AggregatedUnavailableError {
    pub(crate) fn new(chain: impl Into<String>, last: SourceFailure) -> Self {
        let len = std::iter::successors(Some(&last), |f| f.previous()).count();
        Self {
            chain: chain.into(),
            last: Box::new(last),
            len,
        }
    }

    /// Name of the chain that was exhausted.
    #[must_use]
    pub fn chain_name(&self) -> &str {
        &self.chain
    }

    /// Failures in call order (oldest first).
    #[must_use]
    pub fn failures(&self) -> Vec<&SourceFailure> {
        let mut failures: Vec<&SourceFailure> =
            std::iter::successors(Some(self.last.as_ref()), |f| f.previous()).collect();
        failures.reverse();
        failures
    }

    /// Number of folded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: an aggregated error holds at least one failure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if no source got as far as attempting authentication.
    #[must_use]
    pub fn all_unavailable(&self) -> bool {
        std::iter::successors(Some(self.last.as_ref()), |f| f.previous())
            .all(|f| f.kind() == ErrorKind::Unavailable)
    }

    fn fmt_failures(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for failure in self.failures() {
            failure.fmt_item(f, depth)?;
        }
        Ok(())
    }
}

impl fmt::Display for AggregatedUnavailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} failed to retrieve a token from the included credentials.",
            self.chain
        )?;
        self.fmt_failures(f, 0)?;
        write!(f, "To troubleshoot, visit {TROUBLESHOOTING_URL}")
    }
}

impl std::error::Error for AggregatedUnavailableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last.as_ref())
    }
}

/// Outcome of a failed [`crate::ChainedCredential::get_token`] call.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Every source failed; no source reported a fatal error.
    #[error(transparent)]
    Exhausted(#[from] AggregatedUnavailableError),

    /// A fatal error stopped the chain before it was exhausted.
    #[error("{credential} {source}")]
    Aborted {
        /// Source (or chain) that raised the fatal error.
        credential: String,
        /// The fatal error.
        source: AuthError,
    },
}

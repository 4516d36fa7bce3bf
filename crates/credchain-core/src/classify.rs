// SPDX-License-Identifier: Apache-2.0

//! Failure classification for the credential chain.
//!
//! Maps an [`AuthError`] raised by a source to one of three kinds:
//! - **Unavailable**: the mechanism does not apply in this environment. The
//!   chain records it and moves on.
//! - **`AuthenticationFailed`**: the mechanism applied but did not produce a
//!   token. The chain records it, warns, and still moves on.
//! - **Fatal**: the configuration itself is contradictory or the request is
//!   invalid. The chain stops immediately.

use serde::Serialize;

use crate::error::AuthError;

/// Classification of a source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Preconditions for the mechanism are not met here.
    Unavailable,
    /// The mechanism was attempted and failed.
    AuthenticationFailed,
    /// The chain must abort.
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::AuthenticationFailed => write!(f, "authentication failed"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classifies a source failure.
///
/// The unavailable set is closed: explicit [`AuthError::Unavailable`] signals
/// and nested chains that only saw such signals. Everything not marked fatal
/// counts as an authentication failure.
#[must_use]
pub fn classify(err: &AuthError) -> ErrorKind {
    match err {
        AuthError::Unavailable { .. } => ErrorKind::Unavailable,
        AuthError::Chain(inner) if inner.all_unavailable() => ErrorKind::Unavailable,
        AuthError::Misconfigured { .. }
        | AuthError::InvalidRequest { .. }
        | AuthError::Config { .. } => ErrorKind::Fatal,
        AuthError::AuthenticationFailed { .. }
        | AuthError::Network(_)
        | AuthError::Process { .. }
        | AuthError::InvalidResponse(_)
        | AuthError::Chain(_) => ErrorKind::AuthenticationFailed,
    }
}

impl AuthError {
    /// Classification of this error. See [`classify`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }

    /// `true` if the chain should move on silently.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    /// `true` if the chain must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AggregatedUnavailableError, SourceFailure};

    #[test]
    fn test_unavailable_signal() {
        let err = AuthError::unavailable("no managed identity endpoint found");
        assert_eq!(classify(&err), ErrorKind::Unavailable);
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_backend_rejection_is_authentication_failed() {
        let err = AuthError::AuthenticationFailed {
            message: "AADSTS7000215: Invalid client secret provided.".to_string(),
            status: Some(401),
        };
        assert_eq!(classify(&err), ErrorKind::AuthenticationFailed);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_process_error_is_authentication_failed() {
        let err = AuthError::Process {
            program: "az".to_string(),
            source: std::io::Error::other("broken pipe"),
        };
        assert_eq!(classify(&err), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_invalid_response_is_authentication_failed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            classify(&AuthError::InvalidResponse(json_err)),
            ErrorKind::AuthenticationFailed
        );
    }

    #[test]
    fn test_misconfiguration_is_fatal() {
        let err = AuthError::misconfigured("client_id and resource_id are mutually exclusive");
        assert_eq!(classify(&err), ErrorKind::Fatal);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_request_is_fatal() {
        let err = AuthError::invalid_request("at least one scope is required");
        assert_eq!(classify(&err), ErrorKind::Fatal);
    }

    #[test]
    fn test_nested_chain_with_only_unavailable_failures() {
        let first = SourceFailure::new("A", AuthError::unavailable("a"), None);
        let second = SourceFailure::new("B", AuthError::unavailable("b"), Some(first));
        let err = AuthError::Chain(AggregatedUnavailableError::new("Inner", second));
        assert_eq!(classify(&err), ErrorKind::Unavailable);
    }

    #[test]
    fn test_nested_chain_with_attempted_source() {
        let first = SourceFailure::new("A", AuthError::unavailable("a"), None);
        let second = SourceFailure::new("B", AuthError::authentication_failed("b"), Some(first));
        let err = AuthError::Chain(AggregatedUnavailableError::new("Inner", second));
        assert_eq!(classify(&err), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Unavailable.to_string(), "unavailable");
        assert_eq!(
            ErrorKind::AuthenticationFailed.to_string(),
            "authentication failed"
        );
        assert_eq!(ErrorKind::Fatal.to_string(), "fatal");
    }
}

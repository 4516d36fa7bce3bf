// SPDX-License-Identifier: Apache-2.0

//! Retry logic with exponential backoff for transient identity endpoint failures.
//!
//! Only the managed identity source retries. The chain itself never retries a
//! source; a failed source is recorded and the walk moves on.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::error::AuthError;

/// Default number of retries against the managed identity endpoint.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Determines if a managed identity endpoint status code is retryable.
///
/// Retryable status codes are:
/// - 404 (identity not yet provisioned on a new VM)
/// - 410 (IMDS upgrading)
/// - 429 (Too Many Requests)
/// - 500..=599 (server errors)
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 404 | 410 | 429 | 500..=599)
}

/// Determines if a source error is transient and worth retrying.
///
/// Timeouts and server-side statuses are retried. Connection failures are not:
/// they mean the endpoint does not exist here.
#[must_use]
pub fn is_retryable(err: &AuthError) -> bool {
    match err {
        AuthError::Network(e) => {
            e.is_timeout() || e.status().is_some_and(|s| is_retryable_status(s.as_u16()))
        }
        AuthError::AuthenticationFailed {
            status: Some(status),
            ..
        } => is_retryable_status(*status),
        _ => false,
    }
}

/// Creates a configured exponential backoff builder for retries.
///
/// - Factor: 2 (exponential growth)
/// - Min delay: 800 milliseconds
/// - Max times: `max_retries`
/// - Jitter: enabled
#[must_use]
pub fn retry_backoff(max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_factor(2.0)
        .with_min_delay(Duration::from_millis(800))
        .with_max_times(max_retries)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_status_retryable_codes() {
        for status in [404, 410, 429, 500, 502, 503, 504, 599] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
    }

    #[test]
    fn test_is_retryable_status_non_retryable_codes() {
        for status in [200, 400, 401, 403] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn test_is_retryable_auth_failed_with_status() {
        let err = AuthError::AuthenticationFailed {
            message: "busy".to_string(),
            status: Some(503),
        };
        assert!(is_retryable(&err));

        let err = AuthError::AuthenticationFailed {
            message: "denied".to_string(),
            status: Some(400),
        };
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_unavailable_is_not_retryable() {
        assert!(!is_retryable(&AuthError::unavailable("no endpoint")));
    }

    #[test]
    fn test_retry_backoff_configuration() {
        let _: ExponentialBuilder = retry_backoff(DEFAULT_MAX_RETRIES);
    }
}

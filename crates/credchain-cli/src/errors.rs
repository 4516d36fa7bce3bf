// SPDX-License-Identifier: Apache-2.0

//! CLI-specific error formatting with user-friendly hints.
//!
//! Downcasts `anyhow::Error` to the library's `ChainError` and `AuthError`
//! and appends a hint for the user. The library errors stay free of
//! presentation concerns.

use anyhow::Error;
use credchain_core::{AuthError, ChainError, config};

/// Formats an error for CLI display with helpful hints.
///
/// If the error is not a credential error, returns the error chain.
pub fn format_error(error: &Error) -> String {
    if let Some(chain_err) = error.downcast_ref::<ChainError>() {
        return match chain_err {
            ChainError::Exhausted(exhausted) if exhausted.all_unavailable() => format!(
                "{chain_err}\n\nTip: No credential applies here. Sign in with `az login` or \
                 `azd auth login`, or set AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET."
            ),
            ChainError::Exhausted(_) => format!(
                "{chain_err}\n\nTip: Run with -v to see why each credential was rejected."
            ),
            ChainError::Aborted { .. } => format_config_hint(chain_err),
        };
    }

    if let Some(auth_err) = error.downcast_ref::<AuthError>() {
        return match auth_err {
            AuthError::Misconfigured { .. }
            | AuthError::Config { .. }
            | AuthError::InvalidRequest { .. } => format_config_hint(auth_err),
            AuthError::Network(_) => {
                format!("{auth_err}\n\nTip: Check your internet connection and try again.")
            }
            _ => format!("{error:#}"),
        };
    }

    format!("{error:#}")
}

fn format_config_hint(err: &dyn std::fmt::Display) -> String {
    format!(
        "{err}\n\nTip: Check your config file at {} and your AZURE_* environment variables.",
        config::config_file_path().display()
    )
}

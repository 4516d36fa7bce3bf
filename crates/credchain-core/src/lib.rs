// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]

//! # Credchain Core
//!
//! Credential chain resolution for cloud API access.
//!
//! This crate provides:
//! - An ordered credential chain that falls back across independent sources
//!   and pins the one that works
//! - Per-source token caches with silent reuse
//! - Error classification separating "not applicable here" from "tried and
//!   rejected"
//! - A default chain for code that should work unchanged on a laptop, in CI
//!   and on Azure compute
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use credchain_core::{DefaultChainBuilder, TokenRequestContext};
//! use anyhow::Result;
//!
//! # async fn example() -> Result<()> {
//! let credential = DefaultChainBuilder::new().build()?;
//!
//! let ctx = TokenRequestContext::for_scopes(["https://management.azure.com/.default"]);
//! let token = credential.get_token(&ctx).await?;
//! println!("Authorization: {}", token.authorization_header());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`chain`] - Ordered fallback and pinning
//! - [`builder`] - The default chain
//! - [`sources`] - Credential sources
//! - [`cache`] - Per-source token cache
//! - [`classify`] - Error classification
//! - [`config`] - Configuration loading and paths
//! - [`error`] - Error types

// ============================================================================
// Credential Chain
// ============================================================================

pub use builder::{DEFAULT_CHAIN_ORDER, DEFAULT_CREDENTIAL, DefaultChainBuilder, PlannedSource};
pub use chain::{CHAINED_CREDENTIAL, ChainedCredential};
pub use source::CredentialSource;

// ============================================================================
// Tokens and Requests
// ============================================================================

pub use cache::{CachedAccount, TokenCache};
pub use context::TokenRequestContext;
pub use token::{AccessToken, TokenSummary};

// ============================================================================
// Error Handling
// ============================================================================

pub use classify::{ErrorKind, classify};
pub use error::{
    AggregatedUnavailableError, AuthError, ChainError, SourceFailure, TROUBLESHOOTING_URL,
};

/// Convenience Result type for credential operations.
///
/// This is equivalent to `std::result::Result<T, AuthError>`.
pub type Result<T> = std::result::Result<T, AuthError>;

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    ChainConfig, ChainSettings, CliConfig, ExcludeConfig, ManagedIdentityConfig,
    WorkloadIdentityConfig, config_dir, config_file_path, load_config, load_config_from,
};
pub use env::EnvVars;

// ============================================================================
// Retry Logic
// ============================================================================

pub use retry::{is_retryable, retry_backoff};

// ============================================================================
// Modules
// ============================================================================

pub mod builder;
pub mod cache;
pub mod chain;
pub mod classify;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod retry;
pub mod source;
pub mod sources;
pub mod tenant;
pub mod token;

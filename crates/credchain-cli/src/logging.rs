// SPDX-License-Identifier: Apache-2.0

//! Logging initialization for the credchain CLI.
//!
//! Uses `tracing` with `tracing-subscriber`; logs go to stderr so stdout stays
//! parseable. `RUST_LOG` overrides the defaults.
//!
//! # Examples
//!
//! ```bash
//! # See which sources were skipped and why
//! credchain -v token --scope https://management.azure.com/.default
//!
//! # Trace the HTTP client too
//! RUST_LOG=credchain=trace,reqwest=debug credchain token --scope https://vault.azure.net/.default
//! ```

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "credchain=warn,reqwest=error";
/// Filter for `-v` when `RUST_LOG` is unset.
const VERBOSE_FILTER: &str = "credchain=debug,reqwest=error";

/// Initialize the logging subsystem.
pub fn init_logging(verbose: bool) {
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

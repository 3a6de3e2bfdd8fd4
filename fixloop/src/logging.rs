//! Tracing setup for the fixloop CLI.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: per-cycle progress and debugging via
//!   `RUST_LOG`, output to stderr.
//!
//! - **Iteration logging (`io/iteration_log`)**: artifacts in
//!   `.fixloop/iterations/`, controlled by `log_iterations` in the config and
//!   unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `fixloop=info`. Output: stderr, compact.
///
/// # Example
/// ```bash
/// RUST_LOG=fixloop=debug fixloop run
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fixloop=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

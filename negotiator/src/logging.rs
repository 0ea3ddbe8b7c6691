//! Tracing setup shared by the negotiator binaries.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of the negotiation record.
//!
//! - **Persistence (`io/persistence`)**: Session and message records written to
//!   the configured gateway. Always attempted, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; when unset, falls back to `default_directives`
/// (e.g. `"negotiator=info,negotiator_server=info"`).
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=negotiator=debug cargo run -p negotiator-server
/// ```
pub fn init(default_directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

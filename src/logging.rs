//! Tracing subscriber bootstrap for embedding binaries and tests.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize a global tracing subscriber driven by `SDP_LOG` (falling back
/// to `RUST_LOG`, then `info`).
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env("SDP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

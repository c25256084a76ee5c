//! Observability: tracing init.
//!
//! Uses config::ObservabilityConfig for QUARRY_QUIET, QUARRY_LOG_LEVEL, QUARRY_LOG_JSON.

use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing. Call once at process startup; later calls are no-ops.
/// When QUARRY_QUIET=1, only WARN and above are logged. `RUST_LOG` wins over both.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level: String = if cfg.quiet {
        "quarry=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .try_init()
    };
}

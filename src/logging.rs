use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once per process; subsequent calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

use tracing_subscriber::{EnvFilter, fmt};

/// Install the stderr subscriber used by the command-line tools.
///
/// `RUST_LOG` overrides the default `warn` filter; `RUST_LOG=trace` traces
/// every executed instruction.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

use tracing::Level;
use tracing_subscriber::filter::EnvFilter;

/// Install the global stderr subscriber. `RUST_LOG` overrides the default
/// level, which is `info` (or `debug` with `verbose`).
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

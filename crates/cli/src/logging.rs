//! Tracing subscriber setup. Logs go to stderr; stdout carries command output.

use banter_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
pub fn init(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

//! Tracing subscriber initialisation

use livesync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber for the configured level
///
/// `RUST_LOG` takes precedence over `config.level`. Returns false, leaving
/// the existing subscriber in place, if the embedding application already
/// installed one.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => {
            tracing::debug!(level = %config.level, json = config.json, "Tracing initialised");
            true
        }
        Err(_) => false,
    }
}

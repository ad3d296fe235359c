//! Centralised tracing initialisation for processes embedding the backbone.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::BackboneResult;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.level` is used. With
/// `config.json` the output is newline-delimited JSON.
///
/// # Errors
///
/// Returns `BackboneError::Config` if `config.level` is not a valid level.
pub fn init_tracing(config: &LoggingConfig) -> BackboneResult<()> {
    let level = config.level()?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
    Ok(())
}

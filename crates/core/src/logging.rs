//! Structured logging infrastructure for the manufacturing tools.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::{Error, Result};

/// Build the filter for a logging configuration.
///
/// `RUST_LOG` takes precedence over the configured level so line operators can
/// raise verbosity without editing station configuration.
pub fn filter_for(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| Error::InvalidConfig {
            field: "logging.level".to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Initialize the logging system.
///
/// Emits JSON when `config.json` is set, which is what station log collectors
/// ingest; otherwise human-readable lines.
///
/// # Example
/// ```no_run
/// use manuf_core::{config::LoggingConfig, logging};
///
/// logging::init(&LoggingConfig::default()).unwrap();
/// tracing::info!("Station started");
/// ```
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter_for(config)?;

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}

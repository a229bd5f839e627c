//! Tracing initialization.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{BridgeError, Result};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| BridgeError::config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| BridgeError::config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}

/// Resolve the effective logging configuration, applying a CLI level override.
pub fn effective_logging(config: &LoggingConfig, level_override: Option<&str>) -> LoggingConfig {
    match level_override {
        Some(level) => LoggingConfig {
            level: level.to_string(),
            format: config.format,
        },
        None => config.clone(),
    }
}

//! 1-Wire to MQTT Bridge Framework
//!
//! Common abstractions for building bridges that publish sensor state to MQTT.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] trait and its MQTT implementation [`MqttPublisher`]
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use onewire_mqtt_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("config.json");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let (runner, publisher) = BridgeRunner::start("mybridge", &config, Some(&args), 64).await?;
//!     let mut worker = MyWorker::new(publisher);
//!     let outcome = runner.run(worker.run()).await;
//!     runner.shutdown(worker.into_publisher(), outcome).await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod logging;
mod publisher;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::{
    BridgeConfig, DEFAULT_MQTT_PORT, LogFormat, LoggingConfig, MqttConfig, default_client_id,
};
pub use error::{BridgeError, Result};
pub use logging::{effective_logging, init_tracing};
pub use publisher::{MqttMessage, MqttPublisher, PublishStats, Publisher};
pub use runner::BridgeRunner;
pub use status::BridgeStatus;

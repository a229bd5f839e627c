//! Bridge runner for lifecycle management.

use std::future::Future;

use tokio::signal;

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging::{effective_logging, init_tracing};
use crate::publisher::MqttPublisher;
use crate::status::BridgeStatus;

/// Bridge runner that manages the lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT connection, with an `offline` last will when a status topic is configured
/// - Running the worker until it fails or Ctrl+C is received
/// - Status publishing and disconnect on shutdown
///
/// # Example
///
/// ```ignore
/// let args = BridgeArgs::parse_with_default("config.json");
/// let config = MyBridgeConfig::load(&args.config)?;
///
/// let (runner, publisher) = BridgeRunner::start("mybridge", &config, Some(&args), 64).await?;
/// let mut worker = MyWorker::new(publisher);
/// let outcome = runner.run(worker.run()).await;
/// runner.shutdown(worker.into_publisher(), outcome).await
/// ```
#[derive(Debug, Clone)]
pub struct BridgeRunner {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// Topic for retained status messages.
    status_topic: Option<String>,
}

impl BridgeRunner {
    /// Create a runner without starting anything.
    pub fn new(name: impl Into<String>, status_topic: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status_topic,
        }
    }

    /// Start a bridge.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Connect to the MQTT broker
    /// 3. Publish "running" status (if a status topic is configured)
    pub async fn start<C: BridgeConfig>(
        name: impl Into<String>,
        config: &C,
        args: Option<&BridgeArgs>,
        queue_capacity: usize,
    ) -> Result<(Self, MqttPublisher)> {
        let level_override = args.and_then(|a| a.log_level.as_deref());
        init_tracing(&effective_logging(config.logging(), level_override))?;

        let runner = Self::new(name, config.status_topic().map(str::to_string));
        tracing::info!(bridge = %runner.name, version = %runner.version, "Starting bridge");

        let last_will = match runner.status_topic.as_deref() {
            Some(topic) => Some((
                topic,
                BridgeStatus::offline(&runner.name, &runner.version).to_payload()?,
            )),
            None => None,
        };

        let mut publisher =
            MqttPublisher::connect(&config.mqtt(), last_will, queue_capacity).await?;

        if let Some(topic) = runner.status_topic.as_deref() {
            if let Err(e) = BridgeStatus::running(&runner.name, &runner.version)
                .publish(&mut publisher, topic)
                .await
            {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        Ok((runner, publisher))
    }

    /// Get the status topic, if any.
    pub fn status_topic(&self) -> Option<&str> {
        self.status_topic.as_deref()
    }

    /// Run `worker` until it returns or Ctrl+C is received.
    ///
    /// A worker that never returns runs until the signal; a worker error is
    /// returned as [`BridgeError::Worker`].
    pub async fn run<F, E>(&self, worker: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        tracing::info!(bridge = %self.name, "Bridge running. Press Ctrl+C to stop.");

        tokio::select! {
            outcome = worker => match outcome {
                Ok(()) => {
                    tracing::info!(bridge = %self.name, "Worker finished");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(bridge = %self.name, error = %e, "Worker failed");
                    Err(BridgeError::worker(e.to_string()))
                }
            },
            signal = signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                tracing::info!(bridge = %self.name, "Received shutdown signal");
                Ok(())
            }
        }
    }

    /// Publish the final status and disconnect, then hand back the run outcome.
    pub async fn shutdown(self, mut publisher: MqttPublisher, outcome: Result<()>) -> Result<()> {
        if let Some(topic) = self.status_topic.as_deref() {
            let status = match &outcome {
                Ok(()) => BridgeStatus::offline(&self.name, &self.version),
                Err(e) => BridgeStatus::error(&self.name, &self.version, e.to_string()),
            };
            if let Err(e) = status.publish(&mut publisher, topic).await {
                tracing::warn!(error = %e, "Failed to publish final status");
            }
        }

        if let Err(e) = publisher.disconnect().await {
            tracing::warn!(error = %e, "Error closing MQTT connection");
        }

        tracing::info!(bridge = %self.name, "Goodbye!");
        outcome
    }
}

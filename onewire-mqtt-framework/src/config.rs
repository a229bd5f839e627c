//! Configuration traits and utilities.

use std::path::Path;
use std::time::Duration;

use rumqttc::{LastWill, MqttOptions, QoS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
}

/// Default MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

impl MqttConfig {
    /// Settings for `host` with the default port, a per-process client id and a 30s keep-alive.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MQTT_PORT,
            client_id: default_client_id(),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// Broker address for logging, e.g. `mqtt://localhost:1883`.
    pub fn broker_url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }

    /// Build the `rumqttc` options, optionally registering a retained last will.
    pub fn options(&self, last_will: Option<(&str, Vec<u8>)>) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);

        if let Some((topic, payload)) = last_will {
            options.set_last_will(LastWill::new(topic, payload, QoS::AtLeastOnce, true));
        }

        options
    }
}

/// Client id used when none is configured: `onewire-mqtt-<pid>`.
pub fn default_client_id() -> String {
    format!("onewire-mqtt-{}", std::process::id())
}

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// loading, validation, and access to the common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use onewire_mqtt_framework::{BridgeConfig, LoggingConfig, MqttConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt_host: String,
///     #[serde(default)]
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> MqttConfig {
///         MqttConfig::new(&self.mqtt_host)
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT broker settings.
    fn mqtt(&self) -> MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Topic the bridge reports `running`/`offline` status on, if any.
    fn status_topic(&self) -> Option<&str> {
        None
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse and validate configuration from a JSON5 (or plain JSON) string.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        mqtt_host: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn mqtt(&self) -> MqttConfig {
            MqttConfig::new(&self.mqtt_host)
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn validate(&self) -> Result<()> {
            if self.mqtt_host.is_empty() {
                return Err(BridgeError::validation("mqtt_host cannot be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_parse_defaults() {
        let config = TestConfig::parse(r#"{ "mqtt_host": "broker.local" }"#).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);

        let mqtt = config.mqtt();
        assert_eq!(mqtt.port, DEFAULT_MQTT_PORT);
        assert_eq!(mqtt.broker_url(), "mqtt://broker.local:1883");
        assert!(mqtt.client_id.starts_with("onewire-mqtt-"));
    }

    #[test]
    fn test_parse_json_logging_format() {
        let config = TestConfig::parse(
            r#"{
                mqtt_host: "localhost",
                logging: { level: "debug", format: "json" },
            }"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_required_field() {
        let result = TestConfig::parse("{}");
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = TestConfig::parse(r#"{ mqtt_host: "" }"#);
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }
}

//! Configuration for the 1-Wire bridge.
//!
//! The format is JSON5, so the flat JSON `config.json` used by earlier
//! deployments loads unchanged:
//!
//! ```json
//! {
//!     "owserver_host": "localhost",
//!     "owserver_port": 4304,
//!     "mqtt_host": "localhost",
//!     "sensors": [
//!         { "address": "29.F2FBE3467CC2", "attribute": "sensed.A", "id": "garage/door" },
//!         { "address": "29.F2FBE3467CC2", "attribute": "sensed.B", "id": "garage/window", "inverted": true }
//!     ]
//! }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use onewire_mqtt_framework::{
    BridgeConfig, BridgeError, DEFAULT_MQTT_PORT, LoggingConfig, MqttConfig, Result,
    default_client_id,
};
use serde::{Deserialize, Serialize};

use crate::bus::Attribute;
use crate::owserver::DEFAULT_OWSERVER_PORT;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWireBridgeConfig {
    /// owserver host.
    pub owserver_host: String,

    /// owserver TCP port.
    #[serde(default = "default_owserver_port")]
    pub owserver_port: u16,

    /// MQTT broker host.
    pub mqtt_host: String,

    /// MQTT broker port.
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// MQTT client id (default: `onewire-mqtt-<pid>`).
    #[serde(default)]
    pub mqtt_client_id: Option<String>,

    /// MQTT keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub mqtt_keep_alive_secs: u64,

    /// Sensors, in publish order.
    pub sensors: Vec<SensorConfig>,

    /// Only sensors whose attribute contains this text are polled.
    #[serde(default = "default_attribute_filter")]
    pub attribute_filter: String,

    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Timeout for a single owserver request in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// What a failed sensor read does to the poll cycle.
    #[serde(default)]
    pub on_read_error: ReadErrorPolicy,

    /// Topic for retained bridge status messages.
    #[serde(default)]
    pub status_topic: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_owserver_port() -> u16 {
    DEFAULT_OWSERVER_PORT
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keep_alive() -> u64 {
    30
}

fn default_attribute_filter() -> String {
    "sensed".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_read_timeout_ms() -> u64 {
    2000
}

/// One configured sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Bus address, e.g. `29.F2FBE3467CC2`.
    pub address: String,

    /// Attribute to read, e.g. `sensed.A` or `present`.
    pub attribute: String,

    /// MQTT topic to publish on.
    pub id: String,

    /// Swap the ON/OFF mapping of binary values.
    #[serde(default)]
    pub inverted: bool,
}

/// Handling of a failed sensor read within a poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Log the failure, keep the sensor's cached value and continue the cycle.
    #[default]
    Skip,
    /// Abort the cycle without updating any cached value and stop the bridge.
    Abort,
}

/// A sensor as polled at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub address: String,
    pub attribute: Attribute,
    pub id: String,
    pub inverted: bool,
}

impl From<&SensorConfig> for SensorDescriptor {
    fn from(config: &SensorConfig) -> Self {
        Self {
            address: config.address.clone(),
            attribute: Attribute::parse(&config.attribute),
            id: config.id.clone(),
            inverted: config.inverted,
        }
    }
}

impl OneWireBridgeConfig {
    /// Descriptors of the sensors to poll: those whose attribute passes the
    /// attribute filter, in configured order.
    pub fn polled_sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors
            .iter()
            .filter(|sensor| sensor.attribute.contains(&self.attribute_filter))
            .map(SensorDescriptor::from)
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl BridgeConfig for OneWireBridgeConfig {
    fn mqtt(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self
                .mqtt_client_id
                .clone()
                .unwrap_or_else(default_client_id),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
        }
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn status_topic(&self) -> Option<&str> {
        self.status_topic.as_deref()
    }

    fn validate(&self) -> Result<()> {
        if self.owserver_host.is_empty() {
            return Err(BridgeError::validation("owserver_host cannot be empty"));
        }

        if self.mqtt_host.is_empty() {
            return Err(BridgeError::validation("mqtt_host cannot be empty"));
        }

        if self.poll_interval_secs == 0 {
            return Err(BridgeError::validation(
                "poll_interval_secs must be at least 1",
            ));
        }

        if self.read_timeout_ms == 0 {
            return Err(BridgeError::validation("read_timeout_ms must be positive"));
        }

        // rumqttc rejects keep-alives below 5 seconds.
        if self.mqtt_keep_alive_secs < 5 {
            return Err(BridgeError::validation(
                "mqtt_keep_alive_secs must be at least 5",
            ));
        }

        let mut seen = HashSet::new();
        for (index, sensor) in self.sensors.iter().enumerate() {
            if sensor.address.is_empty() {
                return Err(BridgeError::validation(format!(
                    "Sensor #{}: address cannot be empty",
                    index
                )));
            }

            if sensor.attribute.is_empty() {
                return Err(BridgeError::validation(format!(
                    "Sensor '{}': attribute cannot be empty",
                    sensor.address
                )));
            }

            if sensor.id.is_empty() {
                return Err(BridgeError::validation(format!(
                    "Sensor '{}/{}': id cannot be empty",
                    sensor.address, sensor.attribute
                )));
            }

            if !seen.insert((sensor.address.as_str(), sensor.attribute.as_str())) {
                return Err(BridgeError::validation(format!(
                    "Sensor '{}/{}' is configured more than once",
                    sensor.address, sensor.attribute
                )));
            }
        }

        if let Some(topic) = &self.status_topic {
            if topic.is_empty() || topic.contains(['#', '+']) {
                return Err(BridgeError::validation(format!(
                    "Invalid status_topic '{}'",
                    topic
                )));
            }
        }

        Ok(())
    }
}

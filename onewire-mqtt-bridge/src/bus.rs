//! Sensor bus abstraction.
//!
//! A [`SensorBus`] reads one attribute of one sensor. Presence is an explicit
//! reading ([`SensorReading::Present`]) rather than an error: presence sensors
//! appear on and vanish from the bus with the state of their input pin. Any
//! other attribute of a sensor missing from the bus is
//! [`BusError::SensorUnavailable`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::owserver::{OwError, OwServerClient};

/// A typed sensor attribute, resolved once when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Whether the device is currently enumerable on the bus.
    Present,
    /// A PIO sense channel such as `sensed.A` or `sensed.BYTE`.
    Sensed(String),
    /// Temperature in the server's configured scale.
    Temperature,
    /// Any other property, read verbatim.
    Other(String),
}

impl Attribute {
    /// Resolve a configured attribute name.
    pub fn parse(name: &str) -> Self {
        match name {
            "present" => Attribute::Present,
            "temperature" => Attribute::Temperature,
            _ => match name.strip_prefix("sensed.") {
                Some(channel) if !channel.is_empty() => Attribute::Sensed(channel.to_string()),
                _ => Attribute::Other(name.to_string()),
            },
        }
    }

    /// Attribute name as written in the configuration.
    pub fn name(&self) -> String {
        match self {
            Attribute::Present => "present".to_string(),
            Attribute::Sensed(channel) => format!("sensed.{}", channel),
            Attribute::Temperature => "temperature".to_string(),
            Attribute::Other(name) => name.clone(),
        }
    }

    /// owserver path to query for `address`.
    ///
    /// Presence bypasses the server cache so a vanished device is noticed on
    /// the next cycle.
    pub fn path(&self, address: &str) -> String {
        match self {
            Attribute::Present => format!("/uncached/{}", address),
            other => format!("/{}/{}", address, other.name()),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Result of a single bus read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorReading {
    /// Presence of the device on the bus.
    Present(bool),
    /// Raw attribute value as reported by the bus.
    Value(String),
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReading::Present(present) => write!(f, "{}", present),
            SensorReading::Value(value) => f.write_str(value),
        }
    }
}

/// Errors reading from the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// A (non-presence) sensor is not on the bus.
    #[error("Sensor {address} unavailable reading '{attribute}'")]
    SensorUnavailable { address: String, attribute: String },

    /// The bus server could not be queried.
    #[error(transparent)]
    Server(#[from] OwError),
}

/// Reads sensor attributes from a 1-Wire bus.
pub trait SensorBus {
    fn read(
        &self,
        address: &str,
        attribute: &Attribute,
    ) -> impl Future<Output = Result<SensorReading, BusError>> + Send;
}

/// [`SensorBus`] backed by an owserver instance.
#[derive(Debug, Clone)]
pub struct OwServerBus {
    client: OwServerClient,
}

impl OwServerBus {
    /// Connect to owserver at `host:port`, verifying it answers.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, OwError> {
        let client = OwServerClient::new(host, port, timeout);
        client.ping().await?;
        tracing::info!(addr = %client.addr(), "Connected to owserver");
        Ok(Self { client })
    }

    /// Wrap an existing client without probing the server.
    pub fn from_client(client: OwServerClient) -> Self {
        Self { client }
    }
}

impl SensorBus for OwServerBus {
    async fn read(&self, address: &str, attribute: &Attribute) -> Result<SensorReading, BusError> {
        let path = attribute.path(address);

        match attribute {
            Attribute::Present => Ok(SensorReading::Present(self.client.present(&path).await?)),
            _ => match self.client.read(&path).await {
                Ok(value) => Ok(SensorReading::Value(value)),
                Err(OwError::NotFound { .. }) => Err(BusError::SensorUnavailable {
                    address: address.to_string(),
                    attribute: attribute.name(),
                }),
                Err(e) => Err(e.into()),
            },
        }
    }
}

//! MQTT publisher.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::time::Instant;

use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};

/// How long startup waits for the broker's CONNACK.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for the DISCONNECT to be flushed.
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Sink for topic/value pairs.
///
/// `publish` is fire-and-forget: it only queues the message and never waits for
/// the network. `service` must be called periodically; it waits for `timeout`
/// while driving the client's network event loop (keep-alives, queued publishes,
/// inbound messages).
pub trait Publisher {
    /// Queue `payload` for publication on `topic`.
    fn publish(&mut self, topic: &str, payload: &str) -> impl Future<Output = Result<()>> + Send;

    /// Drive the network client for `timeout`.
    fn service(&mut self, timeout: Duration) -> impl Future<Output = Result<()>> + Send;
}

/// Message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
}

type MessageHandler = Box<dyn FnMut(&MqttMessage) + Send>;

/// [`Publisher`] backed by a `rumqttc` client and its event loop.
///
/// The event loop is only driven from [`service`](Publisher::service). Requests
/// are queued without waiting; when the queue is full (e.g. while the broker is
/// unreachable) they fail with [`BridgeError::Publish`] instead of blocking.
pub struct MqttPublisher {
    client: AsyncClient,
    event_loop: EventLoop,
    broker_url: String,
    handler: Option<MessageHandler>,
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("broker_url", &self.broker_url)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl MqttPublisher {
    /// Connect to the broker and wait for its CONNACK.
    ///
    /// Any failure here is a [`BridgeError::BrokerConnection`].
    pub async fn connect(
        config: &MqttConfig,
        last_will: Option<(&str, Vec<u8>)>,
        capacity: usize,
    ) -> Result<Self> {
        let broker_url = config.broker_url();
        tracing::info!(broker = %broker_url, client_id = %config.client_id, "Connecting to MQTT broker");

        let (client, mut event_loop) = AsyncClient::new(config.options(last_will), capacity);

        let connack = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match connack {
            Ok(Ok(ack)) => {
                tracing::info!(broker = %broker_url, session_present = ack.session_present, "Connected to MQTT broker");
            }
            Ok(Err(e)) => return Err(BridgeError::connection(&broker_url, e.to_string())),
            Err(_) => {
                return Err(BridgeError::connection(
                    &broker_url,
                    format!("no CONNACK within {}s", CONNECT_TIMEOUT.as_secs()),
                ));
            }
        }

        Ok(Self {
            client,
            event_loop,
            broker_url,
            handler: None,
        })
    }

    /// Broker address this publisher is connected to.
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Publish a retained message with at-least-once delivery.
    pub async fn publish_retained(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    /// Subscribe to `filter`; inbound messages are passed to `handler` during
    /// [`service`](Publisher::service). A later call replaces the handler.
    pub async fn subscribe<F>(&mut self, filter: &str, handler: F) -> Result<()>
    where
        F: FnMut(&MqttMessage) + Send + 'static,
    {
        tracing::info!(filter = %filter, "Subscribing to MQTT topic filter");
        self.handler = Some(Box::new(handler));
        self.client
            .try_subscribe(filter, QoS::AtMostOnce)
            .map_err(|e| BridgeError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })
    }

    /// Send DISCONNECT and flush it to the broker.
    pub async fn disconnect(mut self) -> Result<()> {
        self.client
            .try_disconnect()
            .map_err(|e| BridgeError::worker(format!("MQTT disconnect failed: {}", e)))?;

        let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;

        tracing::info!(broker = %self.broker_url, "Disconnected from MQTT broker");
        Ok(())
    }

    fn dispatch(&mut self, publish: rumqttc::Publish) {
        let payload = match String::from_utf8(publish.payload.to_vec()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(topic = %publish.topic, error = %e, "Invalid UTF-8 in MQTT payload");
                return;
            }
        };

        let message = MqttMessage {
            topic: publish.topic,
            payload,
            qos: publish.qos,
        };
        tracing::debug!(topic = %message.topic, payload = %message.payload, "Received MQTT message");

        if let Some(handler) = self.handler.as_mut() {
            handler(&message);
        }
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes())
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(topic = %topic, payload = %payload, "Published");
        Ok(())
    }

    async fn service(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, self.event_loop.poll()).await {
                Err(_) => return Ok(()),
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => self.dispatch(publish),
                Ok(Ok(event)) => tracing::trace!(?event, "MQTT event"),
                Ok(Err(e)) => {
                    // The next poll reconnects; wait out the slot instead of spinning.
                    tracing::warn!(broker = %self.broker_url, error = %e, "MQTT connection error");
                    tokio::time::sleep_until(deadline).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Statistics from publishing operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully queued messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Accumulate another batch.
    pub fn add(&mut self, other: PublishStats) {
        self.success += other.success;
        self.failed += other.failed;
    }
}

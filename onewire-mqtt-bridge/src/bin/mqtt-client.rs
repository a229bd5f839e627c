//! Standalone MQTT client for checking a broker.
//!
//! Usage:
//!   mqtt-client --host localhost --publish /foo/bar/baz/temperature=25.7 --cycles 5
//!
//! Subscribes to a topic filter, optionally publishes test messages, and logs
//! everything the broker delivers.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use onewire_mqtt_framework::{
    DEFAULT_MQTT_PORT, LoggingConfig, MqttConfig, MqttPublisher, Publisher, init_tracing,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mqtt-client")]
#[command(about = "Subscribes to an MQTT broker and logs received messages")]
#[command(version)]
struct Args {
    /// Broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, default_value_t = DEFAULT_MQTT_PORT)]
    port: u16,

    /// Topic filter to subscribe to
    #[arg(short, long, default_value = "#")]
    topic: String,

    /// Message to publish after subscribing, as `topic=value` (repeatable)
    #[arg(short, long)]
    publish: Vec<String>,

    /// Number of one-second service cycles before exiting (default: until Ctrl+C)
    #[arg(long)]
    cycles: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Split `topic=value` at the first `=`.
fn parse_message(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once('=') {
        Some((topic, value)) if !topic.is_empty() => Ok((topic, value)),
        _ => bail!("Invalid message '{}', expected topic=value", spec),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        ..LoggingConfig::default()
    })?;

    let messages = args
        .publish
        .iter()
        .map(|spec| parse_message(spec))
        .collect::<Result<Vec<_>>>()?;

    let mut config = MqttConfig::new(&args.host);
    config.port = args.port;

    let mut client = MqttPublisher::connect(&config, None, messages.len() + 16)
        .await
        .context("Failed to connect to MQTT broker")?;

    client
        .subscribe(&args.topic, |message| {
            info!(
                "Received message '{}' on topic '{}' with QoS {:?}",
                message.payload, message.topic, message.qos
            );
        })
        .await?;

    for (topic, value) in messages {
        client.publish(topic, value).await?;
    }

    let interval = Duration::from_secs(1);
    match args.cycles {
        Some(cycles) => {
            for _ in 0..cycles {
                client.service(interval).await?;
            }
        }
        None => loop {
            tokio::select! {
                result = client.service(interval) => result?,
                _ = tokio::signal::ctrl_c() => break,
            }
        },
    }

    client.disconnect().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        assert_eq!(
            parse_message("/foo/bar/baz/temperature=25.7").unwrap(),
            ("/foo/bar/baz/temperature", "25.7")
        );
        assert_eq!(parse_message("a=b=c").unwrap(), ("a", "b=c"));
        assert!(parse_message("no-value").is_err());
        assert!(parse_message("=1").is_err());
    }
}

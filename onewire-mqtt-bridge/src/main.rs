//! 1-Wire to MQTT bridge.
//!
//! Polls 1-Wire sensors through owserver and publishes changes to MQTT.

use anyhow::{Context, Result};
use onewire_mqtt_bridge::bus::OwServerBus;
use onewire_mqtt_bridge::config::OneWireBridgeConfig;
use onewire_mqtt_bridge::poller::PollLoop;
use onewire_mqtt_bridge::tracker::ChangeTracker;
use onewire_mqtt_framework::{BridgeArgs, BridgeConfig, BridgeError, BridgeRunner};
use tracing::info;

/// Headroom in the MQTT request queue beyond one publish per sensor.
const QUEUE_HEADROOM: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("config.json");

    let config = OneWireBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let sensors = config.polled_sensors();

    let (runner, publisher) = BridgeRunner::start(
        "onewire",
        &config,
        Some(&args),
        sensors.len() + QUEUE_HEADROOM,
    )
    .await?;

    info!("Loaded configuration from {:?}", args.config);
    info!(
        polled = sensors.len(),
        configured = config.sensors.len(),
        filter = %config.attribute_filter,
        "Selected sensors"
    );

    let bus = match OwServerBus::connect(
        &config.owserver_host,
        config.owserver_port,
        config.read_timeout(),
    )
    .await
    {
        Ok(bus) => bus,
        Err(e) => {
            let target = format!("owserver {}:{}", config.owserver_host, config.owserver_port);
            let outcome = Err(BridgeError::connection(target, e.to_string()));
            return runner.shutdown(publisher, outcome).await.map_err(Into::into);
        }
    };

    let tracker = ChangeTracker::new(bus, sensors, config.on_read_error);
    let mut poll_loop = PollLoop::new(tracker, publisher, config.poll_interval());

    let outcome = runner.run(poll_loop.run()).await;

    let stats = poll_loop.stats();
    info!(
        cycles = poll_loop.cycles(),
        published = stats.success,
        failed = stats.failed,
        "Poll loop stopped"
    );

    runner.shutdown(poll_loop.into_publisher(), outcome).await?;
    Ok(())
}

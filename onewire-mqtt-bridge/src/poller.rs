//! Poll loop: read sensors, publish changes, wait.

use std::time::Duration;

use onewire_mqtt_framework::{PublishStats, Publisher};
use tracing::{debug, info, warn};

use crate::bus::{BusError, SensorBus, SensorReading};
use crate::tracker::{ChangeTracker, ChangedSensor};

/// MQTT payload for a reading.
///
/// Binary inputs read `"1"` when open and `"0"` when pulled low, so `"1"` maps
/// to `OFF` and `"0"` to `ON`; `inverted` swaps the two. Every other value,
/// presence included, is published as read.
pub fn payload_for(reading: &SensorReading, inverted: bool) -> String {
    match reading {
        SensorReading::Value(raw) if raw == "1" => on_off(!inverted),
        SensorReading::Value(raw) if raw == "0" => on_off(inverted),
        other => other.to_string(),
    }
}

fn on_off(off: bool) -> String {
    let state = if off { "OFF" } else { "ON" };
    state.to_string()
}

/// Drives a [`ChangeTracker`] and a [`Publisher`] at a fixed interval.
pub struct PollLoop<B, P> {
    tracker: ChangeTracker<B>,
    publisher: P,
    interval: Duration,
    stats: PublishStats,
    cycles: u64,
}

impl<B: SensorBus, P: Publisher> PollLoop<B, P> {
    pub fn new(tracker: ChangeTracker<B>, publisher: P, interval: Duration) -> Self {
        Self {
            tracker,
            publisher,
            interval,
            stats: PublishStats::default(),
            cycles: 0,
        }
    }

    /// Poll forever. Returns only when a cycle fails under the abort policy.
    pub async fn run(&mut self) -> Result<(), BusError> {
        info!(
            sensors = self.tracker.descriptors().len(),
            interval_secs = self.interval.as_secs_f64(),
            policy = ?self.tracker.policy(),
            "Starting poll loop"
        );

        loop {
            self.cycle().await?;

            // The wait doubles as the MQTT client's servicing slot.
            if let Err(e) = self.publisher.service(self.interval).await {
                warn!(error = %e, "Publisher service failed");
            }
        }
    }

    /// One poll-and-publish pass, without the trailing wait.
    ///
    /// Returns the publish statistics of this pass.
    pub async fn cycle(&mut self) -> Result<PublishStats, BusError> {
        let report = self.tracker.poll().await?;
        self.cycles += 1;

        if !report.changed.is_empty() {
            let summary: Vec<String> = report
                .changed
                .iter()
                .map(|c| format!("{}={}", c.descriptor.id, c.reading))
                .collect();
            info!(changed = ?summary, "Changed 1-Wire sensors");
        }

        let stats = self.publish_changes(&report.changed).await;
        self.stats.add(stats);

        debug!(
            cycle = self.cycles,
            published = stats.success,
            publish_failures = stats.failed,
            read_failures = report.failed,
            "Poll cycle complete"
        );

        Ok(stats)
    }

    async fn publish_changes(&mut self, changed: &[ChangedSensor]) -> PublishStats {
        let mut stats = PublishStats::default();

        for sensor in changed {
            let payload = payload_for(&sensor.reading, sensor.descriptor.inverted);
            match self.publisher.publish(&sensor.descriptor.id, &payload).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(topic = %sensor.descriptor.id, error = %e, "Failed to publish sensor change");
                }
            }
        }

        stats
    }

    /// Publish statistics accumulated over all cycles.
    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    /// Number of completed poll cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn tracker(&self) -> &ChangeTracker<B> {
        &self.tracker
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Give the publisher back, e.g. for a clean disconnect.
    pub fn into_publisher(self) -> P {
        self.publisher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(raw: &str) -> SensorReading {
        SensorReading::Value(raw.to_string())
    }

    #[test]
    fn test_binary_mapping() {
        assert_eq!(payload_for(&value("1"), false), "OFF");
        assert_eq!(payload_for(&value("1"), true), "ON");
        assert_eq!(payload_for(&value("0"), false), "ON");
        assert_eq!(payload_for(&value("0"), true), "OFF");
    }

    #[test]
    fn test_other_values_unmapped() {
        assert_eq!(payload_for(&value("23.5"), false), "23.5");
        assert_eq!(payload_for(&value("23.5"), true), "23.5");
        assert_eq!(payload_for(&value("10"), false), "10");
        assert_eq!(payload_for(&value(""), false), "");
    }

    #[test]
    fn test_presence_unmapped() {
        assert_eq!(payload_for(&SensorReading::Present(true), false), "true");
        assert_eq!(payload_for(&SensorReading::Present(false), true), "false");
    }
}

//! Change detection over the configured sensors.

use tracing::{debug, warn};

use crate::bus::{BusError, SensorBus, SensorReading};
use crate::config::{ReadErrorPolicy, SensorDescriptor};

/// A sensor whose reading differs from the previous cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedSensor {
    pub descriptor: SensorDescriptor,
    pub reading: SensorReading,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Changed sensors, in configured order.
    pub changed: Vec<ChangedSensor>,
    /// Sensors whose read failed and were skipped this cycle.
    pub failed: usize,
}

/// Tracks the last reading of every sensor and reports which ones changed.
///
/// The cache is keyed by the descriptor's position in configured order and
/// always holds the most recent successful read, changed or not.
pub struct ChangeTracker<B> {
    bus: B,
    descriptors: Vec<SensorDescriptor>,
    last_values: Vec<Option<SensorReading>>,
    policy: ReadErrorPolicy,
}

impl<B: SensorBus> ChangeTracker<B> {
    pub fn new(bus: B, descriptors: Vec<SensorDescriptor>, policy: ReadErrorPolicy) -> Self {
        let last_values = vec![None; descriptors.len()];
        Self {
            bus,
            descriptors,
            last_values,
            policy,
        }
    }

    pub fn descriptors(&self) -> &[SensorDescriptor] {
        &self.descriptors
    }

    pub fn policy(&self) -> ReadErrorPolicy {
        self.policy
    }

    /// Cached reading of the descriptor at `index`.
    pub fn last_value(&self, index: usize) -> Option<&SensorReading> {
        self.last_values.get(index).and_then(Option::as_ref)
    }

    /// Read every sensor once and return those that changed.
    ///
    /// A sensor without a cached reading always counts as changed. Under
    /// [`ReadErrorPolicy::Skip`] a failed read is logged and leaves that
    /// sensor's cache untouched; under [`ReadErrorPolicy::Abort`] the first
    /// failure is returned and no cache entry is updated for the cycle.
    pub async fn poll(&mut self) -> Result<PollReport, BusError> {
        let mut fresh = Vec::with_capacity(self.descriptors.len());
        let mut failed = 0;

        for descriptor in &self.descriptors {
            match self.bus.read(&descriptor.address, &descriptor.attribute).await {
                Ok(reading) => fresh.push(Some(reading)),
                Err(e) => match self.policy {
                    ReadErrorPolicy::Abort => return Err(e),
                    ReadErrorPolicy::Skip => {
                        warn!(
                            sensor = %descriptor.id,
                            address = %descriptor.address,
                            attribute = %descriptor.attribute,
                            error = %e,
                            "Sensor read failed, skipping this cycle"
                        );
                        failed += 1;
                        fresh.push(None);
                    }
                },
            }
        }

        let mut changed = Vec::new();
        for ((descriptor, cached), reading) in self
            .descriptors
            .iter()
            .zip(self.last_values.iter_mut())
            .zip(fresh)
        {
            let Some(reading) = reading else {
                continue;
            };

            if cached.as_ref() != Some(&reading) {
                debug!(
                    sensor = %descriptor.id,
                    previous = ?cached,
                    current = %reading,
                    "Sensor changed"
                );
                changed.push(ChangedSensor {
                    descriptor: descriptor.clone(),
                    reading: reading.clone(),
                });
            }

            *cached = Some(reading);
        }

        Ok(PollReport { changed, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Attribute;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory bus: values keyed by (address, attribute name).
    #[derive(Default)]
    struct FakeBus {
        values: Mutex<HashMap<(String, String), SensorReading>>,
    }

    impl FakeBus {
        fn set(&self, address: &str, attribute: &str, value: &str) {
            self.values.lock().unwrap().insert(
                (address.to_string(), attribute.to_string()),
                SensorReading::Value(value.to_string()),
            );
        }

        fn remove(&self, address: &str) {
            self.values
                .lock()
                .unwrap()
                .retain(|(addr, _), _| addr != address);
        }
    }

    impl SensorBus for &FakeBus {
        async fn read(
            &self,
            address: &str,
            attribute: &Attribute,
        ) -> Result<SensorReading, BusError> {
            let values = self.values.lock().unwrap();
            let found = values
                .keys()
                .any(|(addr, _)| addr == address);

            match attribute {
                Attribute::Present => Ok(SensorReading::Present(found)),
                _ => values
                    .get(&(address.to_string(), attribute.name()))
                    .cloned()
                    .ok_or_else(|| BusError::SensorUnavailable {
                        address: address.to_string(),
                        attribute: attribute.name(),
                    }),
            }
        }
    }

    fn descriptor(address: &str, attribute: &str, id: &str) -> SensorDescriptor {
        SensorDescriptor {
            address: address.to_string(),
            attribute: Attribute::parse(attribute),
            id: id.to_string(),
            inverted: false,
        }
    }

    fn ids(report: &PollReport) -> Vec<&str> {
        report
            .changed
            .iter()
            .map(|c| c.descriptor.id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_first_poll_reports_everything() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");
        bus.set("29.01", "sensed.B", "0");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![
                descriptor("29.01", "sensed.A", "door"),
                descriptor("29.01", "sensed.B", "window"),
            ],
            ReadErrorPolicy::Skip,
        );

        let report = tracker.poll().await.unwrap();
        assert_eq!(ids(&report), vec!["door", "window"]);
        assert_eq!(
            report.changed[0].reading,
            SensorReading::Value("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_stable_values_reported_once() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![descriptor("29.01", "sensed.A", "door")],
            ReadErrorPolicy::Skip,
        );

        assert_eq!(tracker.poll().await.unwrap().changed.len(), 1);
        for _ in 0..5 {
            assert!(tracker.poll().await.unwrap().changed.is_empty());
        }
    }

    #[tokio::test]
    async fn test_only_changes_reported_in_configured_order() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");
        bus.set("29.01", "sensed.B", "1");
        bus.set("29.02", "sensed.A", "1");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![
                descriptor("29.01", "sensed.A", "a"),
                descriptor("29.01", "sensed.B", "b"),
                descriptor("29.02", "sensed.A", "c"),
            ],
            ReadErrorPolicy::Skip,
        );
        tracker.poll().await.unwrap();

        bus.set("29.02", "sensed.A", "0");
        bus.set("29.01", "sensed.A", "0");

        let report = tracker.poll().await.unwrap();
        assert_eq!(ids(&report), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_raw_values_compared_exactly() {
        let bus = FakeBus::default();
        bus.set("10.01", "temperature", "23.5");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![descriptor("10.01", "temperature", "temp")],
            ReadErrorPolicy::Skip,
        );
        tracker.poll().await.unwrap();

        // Numerically equal, textually different.
        bus.set("10.01", "temperature", "23.50");
        let report = tracker.poll().await.unwrap();
        assert_eq!(ids(&report), vec!["temp"]);
    }

    #[tokio::test]
    async fn test_cache_tracks_latest_read() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");
        bus.set("29.01", "sensed.B", "0");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![
                descriptor("29.01", "sensed.A", "a"),
                descriptor("29.01", "sensed.B", "b"),
            ],
            ReadErrorPolicy::Skip,
        );
        assert!(tracker.last_value(0).is_none());

        tracker.poll().await.unwrap();
        bus.set("29.01", "sensed.B", "1");
        tracker.poll().await.unwrap();

        assert_eq!(
            tracker.last_value(0),
            Some(&SensorReading::Value("1".to_string()))
        );
        assert_eq!(
            tracker.last_value(1),
            Some(&SensorReading::Value("1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_presence_toggles() {
        let bus = FakeBus::default();
        bus.set("3A.01", "sensed.A", "1");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![descriptor("3A.01", "present", "button")],
            ReadErrorPolicy::Abort,
        );

        let report = tracker.poll().await.unwrap();
        assert_eq!(report.changed[0].reading, SensorReading::Present(true));

        bus.remove("3A.01");
        let report = tracker.poll().await.unwrap();
        assert_eq!(report.changed[0].reading, SensorReading::Present(false));

        assert!(tracker.poll().await.unwrap().changed.is_empty());
    }

    #[tokio::test]
    async fn test_skip_policy_keeps_cache_of_failed_sensor() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");
        bus.set("29.02", "sensed.A", "1");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![
                descriptor("29.01", "sensed.A", "a"),
                descriptor("29.02", "sensed.A", "b"),
            ],
            ReadErrorPolicy::Skip,
        );
        tracker.poll().await.unwrap();

        bus.remove("29.01");
        bus.set("29.02", "sensed.A", "0");

        let report = tracker.poll().await.unwrap();
        assert_eq!(ids(&report), vec!["b"]);
        assert_eq!(report.failed, 1);
        assert_eq!(
            tracker.last_value(0),
            Some(&SensorReading::Value("1".to_string()))
        );

        // Back on the bus with the same value: not a change.
        bus.set("29.01", "sensed.A", "1");
        let report = tracker.poll().await.unwrap();
        assert!(report.changed.is_empty());
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_abort_policy_leaves_cycle_uncommitted() {
        let bus = FakeBus::default();
        bus.set("29.01", "sensed.A", "1");

        let mut tracker = ChangeTracker::new(
            &bus,
            vec![
                descriptor("29.01", "sensed.A", "a"),
                descriptor("29.02", "sensed.A", "missing"),
            ],
            ReadErrorPolicy::Abort,
        );

        let err = tracker.poll().await.unwrap_err();
        assert!(matches!(err, BusError::SensorUnavailable { ref address, .. } if address == "29.02"));
        assert!(tracker.last_value(0).is_none());
    }
}

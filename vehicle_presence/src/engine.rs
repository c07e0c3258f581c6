//! PresenceEngine ties the sample filter, the classifier and the correlator
//! together behind one owned value.  It is driven from a single thread:
//! one call per sample, one tick per poll, door events as they happen.

use crate::clock::Millis;
use crate::common_structs::{time_string, OccupancyStatus, VehicleReport};
use crate::correlator::Correlator;
use crate::notify::NotificationSink;
use crate::presence::{DebounceConfig, Observation, PresenceClassifier, DEFAULT_AVERAGE_OVER};
use crate::sample_filter::{filter, Discard, DistanceSample, RangeQuality};
use anyhow::{anyhow, Result};
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{trace, warn};

/// Everything tunable about presence detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Anything closer than this is a vehicle, in centimetres
    pub threshold_cm: u32,
    /// Seconds of parking assist when a vehicle arrives, 0 to disable
    pub assist_duration_s: u32,
    /// How long after a door movement presence changes count as motion
    pub presence_window_s: u64,
    /// How long Arriving/Departing is shown for
    pub motion_timeout_ms: u64,
    /// Number of samples the reported distance is averaged over
    pub average_over: u32,
    pub debounce: DebounceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold_cm: 100,
            assist_duration_s: 0,
            presence_window_s: crate::correlator::PRESENCE_DETECT_DURATION.as_secs(),
            motion_timeout_ms: crate::correlator::MOTION_TIMER_DURATION.as_millis() as u64,
            average_over: DEFAULT_AVERAGE_OVER,
            debounce: DebounceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine can't do anything sensible with
    pub fn validate(&self) -> Result<()> {
        if self.threshold_cm == 0 {
            return Err(anyhow!("threshold_cm must be greater than zero"));
        }
        if self.average_over == 0 {
            return Err(anyhow!("average_over must be at least one sample"));
        }
        if self.debounce.history_len == 0 || self.debounce.unanimous_len == 0 {
            return Err(anyhow!("debounce windows must hold at least one sample"));
        }
        if !(1..=100).contains(&self.debounce.on_percent) {
            return Err(anyhow!(
                "debounce on_percent must be 1-100, got {}",
                self.debounce.on_percent
            ));
        }
        if self.debounce.off_windows == 0 {
            return Err(anyhow!("debounce off_windows must be at least one"));
        }
        Ok(())
    }

    pub fn threshold_mm(&self) -> u32 {
        self.threshold_cm.saturating_mul(10)
    }
}

/// The whole presence/occupancy state for one sensor
pub struct PresenceEngine<N: NotificationSink> {
    classifier: PresenceClassifier,
    correlator: Correlator,
    sink: N,
}

impl<N: NotificationSink> PresenceEngine<N> {
    /// Build an engine.  The config is expected to have been validated
    /// already; zero-length windows are bumped to one sample.
    pub fn new(config: &EngineConfig, sink: N) -> Self {
        let mut debounce = config.debounce.clone();
        debounce.history_len = debounce.history_len.max(1);
        debounce.unanimous_len = debounce.unanimous_len.max(1);

        Self {
            classifier: PresenceClassifier::new(
                config.threshold_mm(),
                debounce.build(),
                config.average_over,
            ),
            correlator: Correlator::new(
                Duration::from_secs(config.presence_window_s),
                Duration::from_millis(config.motion_timeout_ms),
                config.assist_duration_s,
            ),
            sink,
        }
    }

    /// Feed one raw reading from the sensor.  Returns None if the reading
    /// was thrown away.
    pub fn observe_sample(&mut self, sample: DistanceSample, now: Millis) -> Option<Observation> {
        if sample.quality == RangeQuality::LowConfidence {
            warn!(
                "Vehicle distance sensor sigma fail. Sensor may be pointing at glass, try repositioning: {}mm",
                sample.distance_mm
            );
        }

        match filter(sample) {
            Ok(distance_mm) => Some(self.observe(distance_mm, now)),
            Err(Discard::TooClose(mm)) => {
                trace!("Ignoring vehicle distance below minimum: {}mm", mm);
                None
            }
            Err(Discard::Unreliable(mm)) => {
                trace!("Ignoring unreliable vehicle distance ({:?}): {}mm", sample.quality, mm);
                None
            }
        }
    }

    /// Feed an already filtered distance
    pub fn observe(&mut self, distance_mm: u32, now: Millis) -> Observation {
        let observation = self.classifier.observe(distance_mm);
        if observation.detected_changed {
            self.correlator
                .presence_changed(observation.detected, now, &mut self.sink);
        }
        observation
    }

    pub fn door_opening(&mut self, now: Millis) {
        self.correlator.door_opening(now);
    }

    pub fn door_closing(&mut self, now: Millis) {
        self.correlator.door_closing(now, &mut self.sink);
    }

    /// Call once per poll to time out Arriving and Departing
    pub fn tick(&mut self, now: Millis) {
        self.correlator.tick(now, &mut self.sink);
    }

    pub fn status(&self) -> OccupancyStatus {
        self.correlator.status()
    }

    pub fn vehicle_detected(&self) -> bool {
        self.classifier.detected()
    }

    pub fn distance_cm(&self) -> u32 {
        self.classifier.distance_cm()
    }

    /// Has the status changed since the reporting layer last asked?
    pub fn take_status_change(&mut self) -> bool {
        self.correlator.take_status_change()
    }

    pub fn report(&self) -> VehicleReport {
        VehicleReport {
            status: self.status(),
            distance_cm: self.distance_cm(),
            detected: self.vehicle_detected(),
            time: time_string(),
        }
    }

    pub fn set_threshold_cm(&mut self, threshold_cm: u32) {
        self.classifier
            .set_threshold_mm(threshold_cm.saturating_mul(10));
    }

    pub fn threshold_cm(&self) -> u32 {
        self.classifier.threshold_mm() / 10
    }

    pub fn set_assist_duration_s(&mut self, seconds: u32) {
        self.correlator.set_assist_duration_s(seconds);
    }
}

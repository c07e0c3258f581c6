//! Algorithms for deciding whether or not there's a vehicle under the
//! sensor.  Produces a smoothed distance for display and a debounced
//! detected flag for the correlator.

use crate::circular_buffer::CircularBuffer;
use crate::sample_filter::MIN_DISTANCE_MM;
use serde_derive::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::{debug, trace};

// Tunable defaults for presence detection.  Increasing these improves
// reliability but also increases detection time.

/// Length of the in-range history for the windowed majority policy, in
/// samples.  This decides how many out of range readings it takes before
/// presence can clear.
pub const DEFAULT_HISTORY_LEN: usize = 256;

/// Minimum percentage of in-range samples in the history to detect a
/// vehicle
pub const DEFAULT_ON_PERCENT: u32 = 5;

/// Number of consecutive full histories that must be at 0% before
/// clearing the detected state
pub const DEFAULT_OFF_WINDOWS: u32 = 2;

/// Length of the unanimous window, in samples
pub const DEFAULT_UNANIMOUS_LEN: usize = 20;

/// The reported distance is averaged over this many samples
pub const DEFAULT_AVERAGE_OVER: u32 = 50;

// A single outlier must never be able to flip a verdict on its own
const_assert!(DEFAULT_UNANIMOUS_LEN >= 2);
const_assert!(DEFAULT_ON_PERCENT as usize * DEFAULT_HISTORY_LEN >= 200);

/// Which debounce algorithm to run.  They trade latency against
/// robustness differently and are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePolicy {
    /// Detect quickly on a small share of in-range samples, clear only
    /// after whole windows of nothing
    #[default]
    WindowedMajority,
    /// Flip only when every recent sample agrees
    Unanimous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub policy: DebouncePolicy,
    pub history_len: usize,
    pub on_percent: u32,
    pub off_windows: u32,
    pub unanimous_len: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            policy: DebouncePolicy::default(),
            history_len: DEFAULT_HISTORY_LEN,
            on_percent: DEFAULT_ON_PERCENT,
            off_windows: DEFAULT_OFF_WINDOWS,
            unanimous_len: DEFAULT_UNANIMOUS_LEN,
        }
    }
}

impl DebounceConfig {
    /// Build the debouncer this config describes
    pub fn build(&self) -> Box<dyn Debounce> {
        match self.policy {
            DebouncePolicy::WindowedMajority => Box::new(WindowedMajority::new(
                self.history_len,
                self.on_percent,
                self.off_windows,
            )),
            DebouncePolicy::Unanimous => Box::new(UnanimousWindow::new(self.unanimous_len)),
        }
    }
}

/// Is this distance close enough to count as a vehicle?  A threshold at or
/// below the minimum plausible distance never detects anything.
pub fn in_range(distance_mm: u32, threshold_mm: u32) -> bool {
    threshold_mm > MIN_DISTANCE_MM && distance_mm <= threshold_mm
}

/// Interface for the debounce strategies
pub trait Debounce {
    /// Feed one filtered sample and return the debounced detected state
    fn update(&mut self, distance_mm: u32, threshold_mm: u32) -> bool;

    fn detected(&self) -> bool;
}

/// Keeps one in-range bit per sample.  Detects as soon as a small
/// percentage of the window is in range, but only clears after the window
/// has been completely empty for several window lengths.
pub struct WindowedMajority {
    history: CircularBuffer<bool>,
    /// Number of true bits in `history`
    in_range_count: usize,
    on_percent: u32,
    off_windows: u32,
    /// Consecutive samples at 0% while detected
    off_counter: usize,
    last_percent: Option<u32>,
    detected: bool,
}

impl WindowedMajority {
    pub fn new(history_len: usize, on_percent: u32, off_windows: u32) -> Self {
        Self {
            history: CircularBuffer::new(history_len),
            in_range_count: 0,
            on_percent,
            off_windows,
            off_counter: 0,
            last_percent: None,
            detected: false,
        }
    }

    /// Share of the window that was in range, as a whole percentage.
    /// Unwritten slots count as out of range.
    pub fn percent(&self) -> u32 {
        (self.in_range_count * 100 / self.history.capacity()) as u32
    }
}

impl Debounce for WindowedMajority {
    fn update(&mut self, distance_mm: u32, threshold_mm: u32) -> bool {
        let hit = in_range(distance_mm, threshold_mm);
        if hit {
            self.in_range_count += 1;
        }
        if let Some(true) = self.history.push(hit) {
            self.in_range_count -= 1;
        }

        let percent = self.percent();
        if percent >= self.on_percent {
            self.detected = true;
        } else if percent == 0 && self.detected {
            self.off_counter += 1;
            trace!("Vehicle distance off_counter: {}", self.off_counter);
            if self.off_counter >= self.history.capacity() * self.off_windows as usize {
                self.off_counter = 0;
                self.detected = false;
            }
        }

        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.off_counter = 0;
            trace!("Vehicle distance in-range: {}%", percent);
        }

        self.detected
    }

    fn detected(&self) -> bool {
        self.detected
    }
}

/// Keeps the last few raw distances and only changes its mind when all of
/// them agree.  Until the window has filled, the missing samples are
/// unknown, which blocks both verdicts.
pub struct UnanimousWindow {
    recent: CircularBuffer<u32>,
    detected: bool,
}

impl UnanimousWindow {
    pub fn new(len: usize) -> Self {
        Self {
            recent: CircularBuffer::new(len),
            detected: false,
        }
    }
}

impl Debounce for UnanimousWindow {
    fn update(&mut self, distance_mm: u32, threshold_mm: u32) -> bool {
        self.recent.push(distance_mm);

        if let Some(window) = self.recent.buffer() {
            if window.iter().all(|&d| in_range(d, threshold_mm)) {
                self.detected = true;
            } else if window.iter().all(|&d| !in_range(d, threshold_mm)) {
                self.detected = false;
            }
        }

        self.detected
    }

    fn detected(&self) -> bool {
        self.detected
    }
}

/// Incremental running average over at most `max_terms` samples.  Must be
/// done in floating point: with integers the per-sample correction
/// `(x - avg) / count` truncates to nothing once count gets large and the
/// average stops moving.
#[derive(Debug, Clone)]
pub struct RunningAverage {
    average: f64,
    count: u32,
    max_terms: u32,
}

impl RunningAverage {
    pub fn new(max_terms: u32) -> Self {
        Self {
            average: 0.0,
            count: 0,
            max_terms: max_terms.max(1),
        }
    }

    pub fn push(&mut self, value: f64) -> f64 {
        if self.count < self.max_terms {
            self.count += 1;
        }
        self.average += (value - self.average) / self.count as f64;
        self.average
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// What the classifier made of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Smoothed distance, truncated to whole centimetres
    pub distance_cm: u32,
    pub detected: bool,
    /// True only on the sample where `detected` changed
    pub detected_changed: bool,
}

/// Smoothed distance plus debounced presence
pub struct PresenceClassifier {
    threshold_mm: u32,
    debounce: Box<dyn Debounce>,
    average: RunningAverage,
    distance_cm: u32,

    /// How many samples since the reported distance last moved, for the
    /// debug log
    samples_since_distance_change: u32,
}

impl PresenceClassifier {
    pub fn new(threshold_mm: u32, debounce: Box<dyn Debounce>, average_over: u32) -> Self {
        Self {
            threshold_mm,
            debounce,
            average: RunningAverage::new(average_over),
            distance_cm: 0,
            samples_since_distance_change: 0,
        }
    }

    /// Feed a filtered distance
    pub fn observe(&mut self, distance_mm: u32) -> Observation {
        let prior = self.debounce.detected();
        let detected = self.debounce.update(distance_mm, self.threshold_mm);

        let average = self.average.push(distance_mm as f64);
        // Distances are never negative so truncation is a floor
        let distance_cm = (average / 10.0) as u32;
        self.samples_since_distance_change += 1;
        if distance_cm != self.distance_cm {
            debug!(
                "Vehicle distance: {}cm (average over {} samples, last changed {} samples ago), current measured: {}cm",
                distance_cm,
                self.average.count(),
                self.samples_since_distance_change,
                distance_mm / 10
            );
            self.distance_cm = distance_cm;
            self.samples_since_distance_change = 0;
        }

        Observation {
            distance_cm,
            detected,
            detected_changed: detected != prior,
        }
    }

    pub fn detected(&self) -> bool {
        self.debounce.detected()
    }

    pub fn distance_cm(&self) -> u32 {
        self.distance_cm
    }

    pub fn threshold_mm(&self) -> u32 {
        self.threshold_mm
    }

    pub fn set_threshold_mm(&mut self, threshold_mm: u32) {
        self.threshold_mm = threshold_mm;
    }
}

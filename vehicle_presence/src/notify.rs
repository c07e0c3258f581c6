//! The hooks the engine calls out through when something worth telling the
//! outside world happens.  Everything is edge triggered: a hook fires once
//! per change, never per sample.

use serde_derive::{Deserialize, Serialize};
use tracing::info;

/// One outbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum VehicleEvent {
    /// A vehicle is (or is no longer) within the threshold distance
    Occupancy(bool),
    /// Arriving was entered (true) or left (false)
    Arrival(bool),
    /// Departing was entered (true) or left (false)
    Departure(bool),
    /// Run the parking assist for this many milliseconds
    Assist(u32),
}

/// Receiver for engine notifications.  Implementors only need `notify`;
/// the per-event hooks funnel into it.
pub trait NotificationSink {
    fn notify(&mut self, event: VehicleEvent);

    fn on_occupancy_changed(&mut self, detected: bool) {
        self.notify(VehicleEvent::Occupancy(detected));
    }

    fn on_arrival_changed(&mut self, active: bool) {
        self.notify(VehicleEvent::Arrival(active));
    }

    fn on_departure_changed(&mut self, active: bool) {
        self.notify(VehicleEvent::Departure(active));
    }

    fn on_assist_trigger(&mut self, duration_ms: u32) {
        self.notify(VehicleEvent::Assist(duration_ms));
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for Box<T> {
    fn notify(&mut self, event: VehicleEvent) {
        (**self).notify(event);
    }
}

/// Just writes every event to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, event: VehicleEvent) {
        info!("Vehicle event: {:?}", event);
    }
}

/// Hands each event to every sink in turn
#[derive(Default)]
pub struct Notifiers {
    sinks: Vec<Box<dyn NotificationSink + Send>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sink: Box<dyn NotificationSink + Send>) {
        self.sinks.push(sink);
    }
}

impl NotificationSink for Notifiers {
    fn notify(&mut self, event: VehicleEvent) {
        for sink in self.sinks.iter_mut() {
            sink.notify(event);
        }
    }
}

/// Test double which remembers everything it was told
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: std::sync::Arc<std::sync::Mutex<Vec<VehicleEvent>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn take(&self) -> Vec<VehicleEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn notify(&mut self, event: VehicleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

//! Vehicle presence detection for a garage door opener.  A time-of-flight
//! sensor on the ceiling reports distances; this crate decides whether a
//! vehicle is parked underneath, and whether it just arrived or left by
//! matching presence changes against door movements.

pub mod circular_buffer;
pub mod clock;
pub mod common_structs;
pub mod correlator;
pub mod engine;
pub mod notify;
pub mod presence;
pub mod reporter;
pub mod sample_filter;
pub mod sample_source;
pub mod settings;
pub mod status_server;

pub use clock::Millis;
pub use common_structs::{OccupancyStatus, VehicleReport};
pub use engine::{EngineConfig, PresenceEngine};
pub use notify::{NotificationSink, VehicleEvent};
pub use sample_filter::{DistanceSample, RangeQuality};

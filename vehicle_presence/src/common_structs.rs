//! Structs shared between the engine and whatever is hosting it, kept in
//! one place so the daemon, the simulator and the status server all agree
//! on them.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// The four-valued classification exposed externally.  Away and Parked are
/// stable, Arriving and Departing always time out back to one of those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OccupancyStatus {
    #[default]
    Away,
    Parked,
    Arriving,
    Departing,
}

impl OccupancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyStatus::Away => "Away",
            OccupancyStatus::Parked => "Parked",
            OccupancyStatus::Arriving => "Arriving",
            OccupancyStatus::Departing => "Departing",
        }
    }

    /// The stable state matching a presence verdict
    pub fn settled(detected: bool) -> Self {
        if detected {
            OccupancyStatus::Parked
        } else {
            OccupancyStatus::Away
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OccupancyStatus::Arriving | OccupancyStatus::Departing)
    }
}

impl fmt::Display for OccupancyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of everything the reporting layer shows about the vehicle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleReport {
    pub status: OccupancyStatus,
    /// Smoothed distance to the nearest object, in centimetres
    pub distance_cm: u32,
    pub detected: bool,
    /// Local time the snapshot was taken
    pub time: String,
}

/// Local wall-clock time for log lines and reports.  The engine itself
/// never looks at this.
pub fn time_string() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

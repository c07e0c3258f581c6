//! Reports vehicle events to a backend server

use crate::common_structs::time_string;
use crate::notify::{NotificationSink, VehicleEvent};
use serde_derive::Serialize;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::Agent;

/// What gets POSTed for each event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    #[serde(flatten)]
    pub event: VehicleEvent,
    pub time: String,
}

/// Notification sink which hands events to a background thread for
/// delivery, so a slow server never holds up the engine
pub struct Reporter {
    tx: mpsc::Sender<EventReport>,
}

impl Reporter {
    pub fn new(url: String) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || Self::reporter_thread(url, rx));
        Self { tx }
    }

    fn reporter_thread(url: String, rx: mpsc::Receiver<EventReport>) {
        let agent: Agent = ureq::AgentBuilder::new()
            .timeout_read(Duration::from_secs(5))
            .timeout_write(Duration::from_secs(5))
            .build();

        info!("Reporter thread started up, reporting to {}", url);

        // Ends when the engine (and so the sender) goes away
        for report in rx {
            debug!("Reporter thread sending {:?}", report);
            // Ignore errors here, the next event will carry the news anyway
            if let Err(e) = agent.post(&url).send_json(&report) {
                warn!("Failed to report {:?}: {}", report.event, e);
            }
        }
    }
}

impl NotificationSink for Reporter {
    fn notify(&mut self, event: VehicleEvent) {
        let report = EventReport {
            event,
            time: time_string(),
        };
        if self.tx.send(report).is_err() {
            warn!("Reporter thread has gone, dropping {:?}", event);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report_json() {
        let report = EventReport {
            event: VehicleEvent::Arrival(true),
            time: "2024-05-01 17:30:00".into(),
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "event": "arrival",
                "value": true,
                "time": "2024-05-01 17:30:00",
            })
        );
    }
}

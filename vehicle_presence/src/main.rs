//! Runs the presence engine against readings from the sensor driver and
//! passes what it decides on to the reporter and status server.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::info;
use vehicle_presence::notify::{LogSink, Notifiers};
use vehicle_presence::reporter::Reporter;
use vehicle_presence::sample_source::{self, InputEvent};
use vehicle_presence::settings::Settings;
use vehicle_presence::status_server::StatusServer;
use vehicle_presence::{Millis, PresenceEngine};

const SETTINGS_FILE: &str = "settings";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_presence=info".into()),
        )
        .init();

    info!("Loading settings...");
    let settings = Settings::load(SETTINGS_FILE)?;
    info!(
        "Vehicle threshold {}cm, {:?} debounce",
        settings.engine.threshold_cm, settings.engine.debounce.policy
    );

    let (tx, rx) = mpsc::channel();

    info!("Setting up input from {}...", settings.input_path);
    let file = File::open(&settings.input_path)
        .with_context(|| format!("couldn't open {}", settings.input_path))?;
    sample_source::start_reader(BufReader::new(file), tx.clone())?;

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(InputEvent::Shutdown);
    })?;

    let mut notifiers = Notifiers::new();
    notifiers.add(Box::new(LogSink));
    match settings.report_url.clone() {
        Some(url) => notifiers.add(Box::new(Reporter::new(url))),
        None => info!("Reporting disabled."),
    }

    let status = if settings.status_server {
        Some(StatusServer::start(settings.status_port, tx.clone()))
    } else {
        info!("Status server disabled.");
        None
    };
    drop(tx);

    let mut engine = PresenceEngine::new(&settings.engine, notifiers);
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);
    let start = Instant::now();
    let mut last_distance_cm = None;

    info!("Vehicle presence running.");
    loop {
        let event = match rx.recv_timeout(poll_interval) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let now = Millis::since_start(start);
        match event {
            Some(InputEvent::Sample(sample)) => {
                engine.observe_sample(sample, now);
            }
            Some(InputEvent::DoorOpening) => engine.door_opening(now),
            Some(InputEvent::DoorClosing) => engine.door_closing(now),
            Some(InputEvent::Configure {
                threshold_cm,
                assist_duration_s,
            }) => {
                if let Some(cm) = threshold_cm {
                    engine.set_threshold_cm(cm);
                    info!("Vehicle threshold now {}cm", engine.threshold_cm());
                }
                if let Some(seconds) = assist_duration_s {
                    info!("Parking assist now {}s", seconds);
                    engine.set_assist_duration_s(seconds);
                }
            }
            Some(InputEvent::Shutdown) => {
                info!("Shutting down.");
                break;
            }
            None => {}
        }

        engine.tick(now);

        // Publish when the status moved or the displayed distance did
        let status_changed = engine.take_status_change();
        let distance_cm = Some(engine.distance_cm());
        if status_changed || distance_cm != last_distance_cm {
            last_distance_cm = distance_cm;
            if let Some(ref status) = status {
                status.publish(engine.report());
            }
        }
    }

    Ok(())
}

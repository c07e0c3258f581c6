//! Serves the latest vehicle status over HTTP and a websocket, and accepts
//! configuration changes which get passed on to the engine thread.

use crate::common_structs::VehicleReport;
use crate::sample_source::InputEvent;
use futures_util::SinkExt;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use warp::ws::WebSocket;
use warp::Filter;

lazy_static! {
    /// The most recently published report, for GET /status
    static ref LATEST: RwLock<VehicleReport> = RwLock::new(VehicleReport::default());
}

/// Handle used by the engine thread to publish reports
pub struct StatusServer {
    tx: broadcast::Sender<VehicleReport>,
}

impl StatusServer {
    /// Start serving on `port` from a thread of its own.  Configuration
    /// posted to /config is forwarded down `control`.
    pub fn start(port: u16, control: mpsc::Sender<InputEvent>) -> Self {
        let (tx, _rx) = broadcast::channel(32);
        let server_tx = tx.clone();

        std::thread::spawn(move || {
            info!("Starting status server on port {}...", port);
            match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime.block_on(serve(port, server_tx, control)),
                Err(e) => error!("Couldn't start status server runtime: {}", e),
            }
        });

        Self { tx }
    }

    /// Make `report` the current status and push it to websocket clients
    pub fn publish(&self, report: VehicleReport) {
        match LATEST.write() {
            Ok(mut latest) => *latest = report.clone(),
            Err(_) => warn!("Status lock poisoned, not updating /status"),
        }
        // No receivers just means nobody is watching
        let _ = self.tx.send(report);
    }
}

/// Read a configuration form into a Configure event.  Values that don't
/// parse are ignored.
pub fn parse_config_form(form: &HashMap<String, String>) -> Option<InputEvent> {
    let threshold_cm = form
        .get("threshold_cm")
        .and_then(|x| x.parse::<u32>().ok())
        .filter(|&x| x > 0);
    let assist_duration_s = form
        .get("assist_duration_s")
        .and_then(|x| x.parse::<u32>().ok());

    if threshold_cm.is_none() && assist_duration_s.is_none() {
        return None;
    }
    Some(InputEvent::Configure {
        threshold_cm,
        assist_duration_s,
    })
}

async fn serve(
    port: u16,
    tx: broadcast::Sender<VehicleReport>,
    control: mpsc::Sender<InputEvent>,
) {
    let status = warp::get().and(warp::path("status")).and(warp::path::end()).map(|| {
        let report = LATEST.read().map(|r| r.clone()).unwrap_or_default();
        warp::reply::json(&report)
    });

    let tx_filter = warp::any().map(move || tx.subscribe());
    let ws = warp::path("ws")
        .and(warp::ws())
        .and(tx_filter)
        .map(|ws: warp::ws::Ws, rx: broadcast::Receiver<VehicleReport>| {
            ws.on_upgrade(move |socket| client_connected(socket, rx))
        });

    let control = Arc::new(Mutex::new(control));
    let control_filter = warp::any().map(move || control.clone());
    let config = warp::post()
        .and(warp::path("config"))
        .and(warp::body::content_length_limit(4096))
        .and(warp::body::form())
        .and(control_filter)
        .map(
            |form: HashMap<String, String>, control: Arc<Mutex<mpsc::Sender<InputEvent>>>| {
                info!("Got configuration: {:?}", form);
                match parse_config_form(&form) {
                    Some(event) => {
                        if let Ok(control) = control.lock() {
                            let _ = control.send(event);
                        }
                        warp::http::StatusCode::NO_CONTENT
                    }
                    None => warp::http::StatusCode::BAD_REQUEST,
                }
            },
        );

    let routes = status.or(ws).or(config);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}

async fn client_connected(mut ws: WebSocket, mut rx: broadcast::Receiver<VehicleReport>) {
    info!("Status client connected.");

    loop {
        let report = match rx.recv().await {
            Ok(report) => report,
            // Fell behind, just carry on with the next one
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let json = match serde_json::to_string(&report) {
            Ok(json) => json,
            Err(e) => {
                error!("Couldn't encode report: {}", e);
                continue;
            }
        };

        if ws.send(warp::ws::Message::text(json)).await.is_err() {
            info!("Status client disconnected.");
            break;
        }
    }
}

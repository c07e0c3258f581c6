//! Receives the vehicle events POSTed by the presence reporter and logs
//! them.

use serde_derive::{Deserialize, Serialize};
use tracing::info;
use warp::Filter;

#[derive(Debug, Deserialize, Serialize)]
struct EventReport {
    event: String,
    value: Value,
    time: String,
}

/// Events carry either a flag or a duration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
enum Value {
    Flag(bool),
    Millis(u32),
}

/// One line summary of an event
fn describe(report: &EventReport) -> String {
    match (report.event.as_str(), &report.value) {
        ("occupancy", Value::Flag(true)) => "vehicle detected".into(),
        ("occupancy", Value::Flag(false)) => "vehicle gone".into(),
        ("arrival", Value::Flag(true)) => "vehicle arriving".into(),
        ("departure", Value::Flag(true)) => "vehicle departing".into(),
        ("arrival", Value::Flag(false)) | ("departure", Value::Flag(false)) => {
            "vehicle settled".into()
        }
        ("assist", Value::Millis(ms)) => format!("parking assist for {}ms", ms),
        (event, value) => format!("unexpected {} {:?}", event, value),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presence_backend=info".into()),
        )
        .init();

    let vehicle = warp::post()
        .and(warp::path("vehicle"))
        // Only accept bodies smaller than 16kb
        .and(warp::body::content_length_limit(1024 * 16))
        .and(warp::body::json())
        .map(|report: EventReport| {
            info!("{}: {}", report.time, describe(&report));
            warp::reply()
        });

    info!("Listening for vehicle events on port 1309");
    warp::serve(vehicle).run(([0, 0, 0, 0], 1309)).await
}

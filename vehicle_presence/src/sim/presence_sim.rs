//! Standalone console application which drives the presence engine with
//! synthetic, noisy sensor readings for a car arriving and then leaving.
//! It can be run by using the following command:
//! cargo run --bin presence_sim

use rand::Rng;
use tracing::info;
use vehicle_presence::notify::LogSink;
use vehicle_presence::{DistanceSample, EngineConfig, Millis, PresenceEngine, RangeQuality};

/// The sensor produces a reading every 100ms
const SAMPLE_PERIOD_MS: u64 = 100;

/// Distance from the ceiling to the floor and to a car roof
const FLOOR_MM: f64 = 2600.0;
const ROOF_MM: f64 = 700.0;

/// Something that happens at a point in simulated time
enum Action {
    DoorOpening,
    DoorClosing,
    /// Start moving the car towards this distance over this many ms
    Drive(f64, u64),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_presence=info,presence_sim=info".into()),
        )
        .init();

    let script: Vec<(u64, Action)> = vec![
        (60_000, Action::DoorOpening),
        (75_000, Action::Drive(ROOF_MM, 4000)),
        (90_000, Action::DoorClosing),
        (600_000, Action::DoorOpening),
        (612_000, Action::Drive(FLOOR_MM, 4000)),
        (630_000, Action::DoorClosing),
    ];
    let end_ms = 900_000;

    let config = EngineConfig::default();
    let mut engine = PresenceEngine::new(&config, LogSink);
    let mut rng = rand::thread_rng();

    let mut script = script.into_iter().peekable();
    let mut target_mm = FLOOR_MM;
    let mut current_mm = FLOOR_MM;
    let mut step_mm = 0.0;

    let mut t = 0;
    while t < end_ms {
        let now = Millis(t);

        while let Some((_, action)) = script.next_if(|(at, _)| *at <= t) {
            match action {
                Action::DoorOpening => {
                    info!("[{:>6.1}s] door opening", t as f64 / 1000.0);
                    engine.door_opening(now);
                }
                Action::DoorClosing => {
                    info!("[{:>6.1}s] door closing", t as f64 / 1000.0);
                    engine.door_closing(now);
                }
                Action::Drive(to, over_ms) => {
                    info!("[{:>6.1}s] car moving", t as f64 / 1000.0);
                    target_mm = to;
                    step_mm = (to - current_mm) / (over_ms / SAMPLE_PERIOD_MS) as f64;
                }
            }
        }

        if (current_mm - target_mm).abs() > step_mm.abs() {
            current_mm += step_mm;
        } else {
            current_mm = target_mm;
        }

        engine.observe_sample(noisy_sample(&mut rng, current_mm), now);
        engine.tick(now);

        if engine.take_status_change() {
            info!(
                "[{:>6.1}s] status {} ({}cm)",
                t as f64 / 1000.0,
                engine.status(),
                engine.distance_cm()
            );
        }

        t += SAMPLE_PERIOD_MS;
    }
}

/// A reading around `true_mm`, with the sort of junk a real sensor gives
fn noisy_sample(rng: &mut impl Rng, true_mm: f64) -> DistanceSample {
    match rng.gen_range(0..1000) {
        // Bug walking across the lens
        0..=4 => DistanceSample::valid(rng.gen_range(0..25)),
        5..=14 => DistanceSample::new(0, RangeQuality::NoObject),
        15..=19 => DistanceSample::new(rng.gen_range(0..4000), RangeQuality::Unreliable),
        20..=39 => DistanceSample::new(
            (true_mm + rng.gen_range(-200.0..200.0)).max(0.0) as u32,
            RangeQuality::LowConfidence,
        ),
        _ => DistanceSample::valid((true_mm + rng.gen_range(-30.0..30.0)).max(0.0) as u32),
    }
}

//! Reads sensor readings and door events from whatever the sensor driver
//! writes to, one per line:
//!
//! ```text
//! distance <mm> <range status code>
//! door opening
//! door closing
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::sample_filter::{DistanceSample, RangeQuality};
use anyhow::{anyhow, Context, Result};
use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{error, info, warn};

/// Everything the engine thread can be asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Sample(DistanceSample),
    DoorOpening,
    DoorClosing,
    /// New settings from the control interface
    Configure {
        threshold_cm: Option<u32>,
        assist_duration_s: Option<u32>,
    },
    Shutdown,
}

/// Parse one input line.  Ok(None) for lines with nothing in them.
pub fn parse_line(line: &str) -> Result<Option<InputEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next(), words.next()) {
        (Some("distance"), Some(mm), Some(code), None) => {
            let distance_mm: u32 = mm
                .parse()
                .with_context(|| format!("bad distance {:?}", mm))?;
            let code: u8 = code
                .parse()
                .with_context(|| format!("bad range status {:?}", code))?;
            let quality = RangeQuality::from_status_code(code);
            if quality == RangeQuality::Unreliable && code != 7 {
                error!("Unhandled range status: {}, range: {}mm", code, distance_mm);
            }
            Ok(Some(InputEvent::Sample(DistanceSample::new(
                distance_mm,
                quality,
            ))))
        }
        (Some("door"), Some("opening"), None, None) => Ok(Some(InputEvent::DoorOpening)),
        (Some("door"), Some("closing"), None, None) => Ok(Some(InputEvent::DoorClosing)),
        _ => Err(anyhow!("unrecognised input line {:?}", line)),
    }
}

/// Start a thread reading lines from `reader` and forwarding them to the
/// engine.  Malformed lines are logged and skipped.  When the input ends
/// the engine is told to shut down.
pub fn start_reader<R>(reader: R, tx: Sender<InputEvent>) -> Result<()>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("presence input".into())
        .spawn(move || reader_thread(reader, tx))?;
    Ok(())
}

fn reader_thread<R: BufRead>(mut reader: R, tx: Sender<InputEvent>) {
    info!("Input thread running.");
    let mut line_buf = String::new();

    loop {
        line_buf.clear();
        match reader.read_line(&mut line_buf) {
            Ok(0) => {
                info!("Input closed.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error reading input: {}", e);
                break;
            }
        }

        match parse_line(&line_buf) {
            Ok(Some(event)) => {
                if tx.send(event).is_err() {
                    // Engine has gone away
                    return;
                }
            }
            Ok(None) => continue,
            Err(e) => warn!("Skipping input: {:#}", e),
        }
    }

    let _ = tx.send(InputEvent::Shutdown);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::channel;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("distance 1234 0\n").unwrap(),
            Some(InputEvent::Sample(DistanceSample::valid(1234)))
        );
        assert_eq!(
            parse_line("  distance 80 2").unwrap(),
            Some(InputEvent::Sample(DistanceSample::new(80, RangeQuality::NoObject)))
        );
        assert_eq!(parse_line("door opening").unwrap(), Some(InputEvent::DoorOpening));
        assert_eq!(parse_line("door closing").unwrap(), Some(InputEvent::DoorClosing));
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("distance -5 0").is_err());
        assert!(parse_line("distance 100").is_err());
        assert!(parse_line("distance 100 0 extra").is_err());
        assert!(parse_line("door slamming").is_err());
        assert!(parse_line("hello").is_err());
    }

    #[test]
    fn test_reader_skips_garbage() {
        let input = Cursor::new("distance 500 0\nnonsense\n\ndoor closing\n");
        let (tx, rx) = channel();
        start_reader(input, tx).unwrap();

        let events: Vec<InputEvent> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                InputEvent::Sample(DistanceSample::valid(500)),
                InputEvent::DoorClosing,
                InputEvent::Shutdown,
            ]
        );
    }
}

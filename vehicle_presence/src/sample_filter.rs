//! Turns a raw time-of-flight reading into a distance the classifier can
//! trust, or throws it away.

use serde_derive::{Deserialize, Serialize};

/// Anything closer than this is a bug crawling on the lens
pub const MIN_DISTANCE_MM: u32 = 25;

/// Long distance mode tops out at about 4m, so "nothing there" is reported
/// as this
pub const MAX_DISTANCE_MM: u32 = 4000;

/// How much the sensor trusts a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeQuality {
    Valid,
    /// Sigma fail.  Usually means the sensor is looking through glass.
    LowConfidence,
    /// Signal fail, nothing reflected
    NoObject,
    /// Phase out of bounds, also nothing in range
    OutOfBounds,
    /// Wraparound or anything we don't understand
    Unreliable,
}

impl RangeQuality {
    /// Map a VL53L1X range status code
    pub fn from_status_code(code: u8) -> Self {
        match code {
            0 => RangeQuality::Valid,
            1 => RangeQuality::LowConfidence,
            2 => RangeQuality::NoObject,
            4 => RangeQuality::OutOfBounds,
            _ => RangeQuality::Unreliable,
        }
    }
}

/// A single sensor reading as handed over by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceSample {
    pub distance_mm: u32,
    pub quality: RangeQuality,
}

impl DistanceSample {
    pub fn new(distance_mm: u32, quality: RangeQuality) -> Self {
        Self {
            distance_mm,
            quality,
        }
    }

    pub fn valid(distance_mm: u32) -> Self {
        Self::new(distance_mm, RangeQuality::Valid)
    }
}

/// Why a sample never made it to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Closer than MIN_DISTANCE_MM
    TooClose(u32),
    /// The sensor couldn't vouch for the reading
    Unreliable(u32),
}

/// Decide what distance, if any, a raw sample stands for.  No-object
/// conditions become MAX_DISTANCE_MM, unreliable ones are dropped rather
/// than guessed at.
pub fn filter(sample: DistanceSample) -> Result<u32, Discard> {
    let distance = match sample.quality {
        RangeQuality::Valid | RangeQuality::LowConfidence => sample.distance_mm,
        RangeQuality::NoObject | RangeQuality::OutOfBounds => MAX_DISTANCE_MM,
        RangeQuality::Unreliable => return Err(Discard::Unreliable(sample.distance_mm)),
    };

    if distance < MIN_DISTANCE_MM {
        return Err(Discard::TooClose(distance));
    }
    Ok(distance)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_valid_readings_pass_through() {
        assert_eq!(filter(DistanceSample::valid(1234)), Ok(1234));
        assert_eq!(filter(DistanceSample::valid(MIN_DISTANCE_MM)), Ok(MIN_DISTANCE_MM));
        assert_eq!(
            filter(DistanceSample::new(800, RangeQuality::LowConfidence)),
            Ok(800)
        );
    }

    #[test]
    fn test_too_close_is_discarded() {
        assert_eq!(filter(DistanceSample::valid(24)), Err(Discard::TooClose(24)));
        assert_eq!(filter(DistanceSample::valid(0)), Err(Discard::TooClose(0)));
    }

    #[test]
    fn test_no_object_is_max_range() {
        // Whatever the driver put in the distance field is ignored
        assert_eq!(
            filter(DistanceSample::new(3, RangeQuality::NoObject)),
            Ok(MAX_DISTANCE_MM)
        );
        assert_eq!(
            filter(DistanceSample::new(100, RangeQuality::OutOfBounds)),
            Ok(MAX_DISTANCE_MM)
        );
    }

    #[test]
    fn test_unreliable_is_discarded() {
        assert_eq!(
            filter(DistanceSample::new(500, RangeQuality::Unreliable)),
            Err(Discard::Unreliable(500))
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RangeQuality::from_status_code(0), RangeQuality::Valid);
        assert_eq!(RangeQuality::from_status_code(1), RangeQuality::LowConfidence);
        assert_eq!(RangeQuality::from_status_code(2), RangeQuality::NoObject);
        assert_eq!(RangeQuality::from_status_code(4), RangeQuality::OutOfBounds);
        assert_eq!(RangeQuality::from_status_code(7), RangeQuality::Unreliable);
        assert_eq!(RangeQuality::from_status_code(13), RangeQuality::Unreliable);
    }
}

//! Monotonic time as seen by the engine.  The caller owns the clock and
//! hands in a millisecond count with every input; the engine only ever
//! compares timestamps it has been given.

use serde_derive::Serialize;
use std::time::{Duration, Instant};

/// Milliseconds on a caller-supplied monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Millis(pub u64);

impl Millis {
    /// Milliseconds elapsed on the host's monotonic clock since `start`
    pub fn since_start(start: Instant) -> Self {
        Self(start.elapsed().as_millis() as u64)
    }

    /// How long after `earlier` this timestamp is.  None if `earlier` is
    /// actually in the future, which only happens if the clock misbehaved.
    pub fn since(self, earlier: Millis) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_millis)
    }

    /// Is this timestamp strictly less than `window` after `earlier`?
    /// A backwards step is never inside a window.
    pub fn within(self, earlier: Millis, window: Duration) -> bool {
        matches!(self.since(earlier), Some(elapsed) if elapsed < window)
    }

    /// Has `timeout` run out since `start`?  A backwards step counts as
    /// expired so transient states can't get stuck.
    pub fn expired(self, start: Millis, timeout: Duration) -> bool {
        match self.since(start) {
            Some(elapsed) => elapsed >= timeout,
            None => true,
        }
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }
}

//! The Correlator decides whether a change in presence was a vehicle
//! driving in or out, by looking for a door movement close to it in time.
//! It owns the occupancy status and times out the transient states.

use crate::clock::Millis;
use crate::common_structs::{time_string, OccupancyStatus};
use crate::notify::NotificationSink;
use std::time::Duration;
use tracing::{debug, info};

/// How long after the door starts moving a presence change still counts as
/// arriving or departing
pub const PRESENCE_DETECT_DURATION: Duration = Duration::from_secs(5 * 60);

/// How long Arriving or Departing is shown before settling
pub const MOTION_TIMER_DURATION: Duration = Duration::from_millis(5000);

/// State machine turning presence flips and door events into an
/// occupancy status.  Only Arriving and Departing carry timers; they are
/// always left again, either by timing out or by another flip.
pub struct Correlator {
    status: OccupancyStatus,

    /// Latest debounced presence
    detected: bool,

    /// When the door last started opening or closing.  Cleared once a flip
    /// has been attributed to it.
    door_event_at: Option<Millis>,

    /// When presence last flipped
    last_flip_at: Option<Millis>,

    /// Counts presence flips.  Two flips can share a timestamp, so this
    /// is what identifies one.
    flip_seq: u64,

    /// The flip that was last classified as motion, so a door closing
    /// can't classify the same flip twice
    classified_flip: Option<u64>,

    /// When the current Arriving or Departing was entered
    motion_started_at: Option<Millis>,

    window: Duration,
    motion_timeout: Duration,

    /// Seconds of parking assist on arrival, 0 for none
    assist_duration_s: u32,

    /// Set whenever the status changes, cleared by the reporting layer
    status_changed: bool,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(PRESENCE_DETECT_DURATION, MOTION_TIMER_DURATION, 0)
    }
}

impl Correlator {
    pub fn new(window: Duration, motion_timeout: Duration, assist_duration_s: u32) -> Self {
        Self {
            status: OccupancyStatus::Away,
            detected: false,
            door_event_at: None,
            last_flip_at: None,
            flip_seq: 0,
            classified_flip: None,
            motion_started_at: None,
            window,
            motion_timeout,
            assist_duration_s,
            status_changed: false,
        }
    }

    /// The door started opening.  Presence changes over the next window
    /// count as motion.
    pub fn door_opening(&mut self, now: Millis) {
        debug!("Door opening, watching for vehicle motion");
        self.door_event_at = Some(now);
    }

    /// The door started closing.  As well as opening a window like
    /// door_opening, this looks back: the vehicle may already have left or
    /// arrived before the close was seen.  The window stays open unless the
    /// look-back classified something.
    pub fn door_closing(&mut self, now: Millis, sink: &mut impl NotificationSink) {
        debug!("Door closing, checking for vehicle motion");
        self.door_event_at = Some(now);

        if let Some(flip_at) = self.last_flip_at {
            if now.within(flip_at, self.window)
                && self.classify_motion(self.detected, self.flip_seq, flip_at, sink)
            {
                self.door_event_at = None;
            }
        }
    }

    /// Debounced presence flipped at `now`
    pub fn presence_changed(
        &mut self,
        detected: bool,
        now: Millis,
        sink: &mut impl NotificationSink,
    ) {
        self.detected = detected;
        self.last_flip_at = Some(now);
        self.flip_seq += 1;

        let correlated = self
            .door_event_at
            .map_or(false, |door_at| now.within(door_at, self.window));
        if correlated {
            // One door movement explains at most one flip
            if self.classify_motion(detected, self.flip_seq, now, sink) {
                self.door_event_at = None;
            }
        } else {
            self.set_status(OccupancyStatus::settled(detected), sink);
        }

        sink.on_occupancy_changed(detected);
    }

    /// Expire Arriving or Departing once the motion timer has run out
    pub fn tick(&mut self, now: Millis, sink: &mut impl NotificationSink) {
        if !self.status.is_transient() {
            return;
        }
        let expired = match self.motion_started_at {
            Some(started) => now.expired(started, self.motion_timeout),
            None => true,
        };
        if expired {
            self.set_status(OccupancyStatus::settled(self.detected), sink);
        }
    }

    /// Enter Arriving or Departing for flip number `flip` at `flip_at`.
    /// Returns false if that flip had already been classified.
    fn classify_motion(
        &mut self,
        detected: bool,
        flip: u64,
        flip_at: Millis,
        sink: &mut impl NotificationSink,
    ) -> bool {
        if self.classified_flip == Some(flip) {
            return false;
        }
        self.classified_flip = Some(flip);

        let next = if detected {
            OccupancyStatus::Arriving
        } else {
            OccupancyStatus::Departing
        };
        if self.status != next {
            self.motion_started_at = Some(flip_at);
            self.set_status(next, sink);
            if next == OccupancyStatus::Arriving && self.assist_duration_s > 0 {
                sink.on_assist_trigger(self.assist_duration_s.saturating_mul(1000));
            }
        }
        true
    }

    /// Move to `next`, firing the arrival/departure hooks for whichever
    /// transient states were left or entered
    fn set_status(&mut self, next: OccupancyStatus, sink: &mut impl NotificationSink) {
        let prev = self.status;
        if prev == next {
            return;
        }
        self.status = next;
        self.status_changed = true;
        info!("Vehicle {} at {}", next, time_string());

        match prev {
            OccupancyStatus::Arriving => sink.on_arrival_changed(false),
            OccupancyStatus::Departing => sink.on_departure_changed(false),
            _ => {}
        }
        match next {
            OccupancyStatus::Arriving => sink.on_arrival_changed(true),
            OccupancyStatus::Departing => sink.on_departure_changed(true),
            _ => self.motion_started_at = None,
        }
    }

    pub fn status(&self) -> OccupancyStatus {
        self.status
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    /// When the current transient state will time out, if there is one
    pub fn motion_expiry(&self) -> Option<Millis> {
        self.motion_started_at
            .map(|started| started.saturating_add(self.motion_timeout))
    }

    /// Is a door movement currently waiting for a presence change?
    pub fn window_open(&self, now: Millis) -> bool {
        self.door_event_at
            .map_or(false, |door_at| now.within(door_at, self.window))
    }

    /// Has the status changed since this was last called?
    pub fn take_status_change(&mut self) -> bool {
        std::mem::take(&mut self.status_changed)
    }

    pub fn set_assist_duration_s(&mut self, seconds: u32) {
        self.assist_duration_s = seconds;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notify::{RecordingSink, VehicleEvent};

    const WINDOW_MS: u64 = 5 * 60 * 1000;
    const T_MS: u64 = 5000;

    fn setup() -> (Correlator, RecordingSink) {
        (Correlator::default(), RecordingSink::default())
    }

    #[test]
    fn test_flip_inside_window_is_arrival() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Arriving);
        assert_eq!(c.motion_expiry(), Some(Millis(100 + T_MS)));
        assert_eq!(
            sink.take(),
            vec![VehicleEvent::Arrival(true), VehicleEvent::Occupancy(true)]
        );
        assert!(!c.window_open(Millis(200)));
    }

    #[test]
    fn test_flip_outside_window_is_silent() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(WINDOW_MS + 1), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        assert_eq!(sink.take(), vec![VehicleEvent::Occupancy(true)]);
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(WINDOW_MS), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
    }

    #[test]
    fn test_no_door_event_is_silent() {
        let (mut c, mut sink) = setup();
        c.presence_changed(true, Millis(10), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        c.presence_changed(false, Millis(20), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Away);
        assert_eq!(
            sink.take(),
            vec![VehicleEvent::Occupancy(true), VehicleEvent::Occupancy(false)]
        );
    }

    #[test]
    fn test_expiry_and_idempotence() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(0), &mut sink);
        sink.take();

        c.tick(Millis(T_MS - 1), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Arriving);

        c.tick(Millis(T_MS + 1), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        assert_eq!(c.motion_expiry(), None);
        assert_eq!(sink.take(), vec![VehicleEvent::Arrival(false)]);

        for t in 0..10 {
            c.tick(Millis(T_MS + 100 * t), &mut sink);
        }
        assert_eq!(c.status(), OccupancyStatus::Parked);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_clock_going_backwards_expires() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(10_000));
        c.presence_changed(false, Millis(10_000), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        c.tick(Millis(5), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Away);
    }

    #[test]
    fn test_flip_before_door_opening_is_not_correlated() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(1000));
        c.presence_changed(true, Millis(900), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
    }

    #[test]
    fn test_arriving_and_departing_are_exclusive() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        c.door_opening(Millis(200));
        c.presence_changed(false, Millis(300), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        assert_eq!(
            sink.take(),
            vec![
                VehicleEvent::Arrival(true),
                VehicleEvent::Occupancy(true),
                VehicleEvent::Arrival(false),
                VehicleEvent::Departure(true),
                VehicleEvent::Occupancy(false),
            ]
        );
    }

    #[test]
    fn test_uncorrelated_flip_clears_transient_state() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        // Window was used up by the arrival
        c.presence_changed(false, Millis(200), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Away);
        assert_eq!(
            sink.take(),
            vec![
                VehicleEvent::Arrival(true),
                VehicleEvent::Occupancy(true),
                VehicleEvent::Arrival(false),
                VehicleEvent::Occupancy(false),
            ]
        );
    }

    #[test]
    fn test_door_closing_looks_back() {
        let (mut c, mut sink) = setup();
        c.presence_changed(true, Millis(0), &mut sink);
        c.presence_changed(false, Millis(950), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Away);
        c.door_closing(Millis(1000), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        // Expiry runs from the flip, not the door
        assert_eq!(c.motion_expiry(), Some(Millis(950 + T_MS)));

        c.door_closing(Millis(1100), &mut sink);
        assert_eq!(
            sink.take(),
            vec![
                VehicleEvent::Occupancy(true),
                VehicleEvent::Occupancy(false),
                VehicleEvent::Departure(true),
            ]
        );
    }

    #[test]
    fn test_door_closing_after_correlated_arrival() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(3000), &mut sink);
        c.tick(Millis(3000 + T_MS), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        sink.take();

        // Same flip, must not be reported as a second arrival
        c.door_closing(Millis(15_000), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        assert!(sink.take().is_empty());
        assert!(c.window_open(Millis(15_100)));
    }

    #[test]
    fn test_door_closing_keeps_window_for_departure() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Arriving);
        c.tick(Millis(10_000), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        sink.take();

        // Nothing new to look back at, so the close only looks forward
        c.door_closing(Millis(20_000), &mut sink);
        assert!(c.window_open(Millis(20_000)));

        c.presence_changed(false, Millis(30_000), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        assert_eq!(
            sink.take(),
            vec![VehicleEvent::Departure(true), VehicleEvent::Occupancy(false)]
        );
        assert!(!c.window_open(Millis(30_100)));
    }

    #[test]
    fn test_flips_sharing_a_timestamp() {
        let (mut c, mut sink) = setup();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        c.door_opening(Millis(100));
        c.presence_changed(false, Millis(100), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        assert!(!c.detected());
        assert_eq!(
            sink.take(),
            vec![
                VehicleEvent::Arrival(true),
                VehicleEvent::Occupancy(true),
                VehicleEvent::Arrival(false),
                VehicleEvent::Departure(true),
                VehicleEvent::Occupancy(false),
            ]
        );

        // The look-back sees the latest flip as already handled
        c.door_closing(Millis(200), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Departing);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_door_closing_with_stale_flip() {
        let (mut c, mut sink) = setup();
        c.presence_changed(true, Millis(0), &mut sink);
        c.door_closing(Millis(WINDOW_MS + 10), &mut sink);
        assert_eq!(c.status(), OccupancyStatus::Parked);
        // Still opens a window looking forward
        assert!(c.window_open(Millis(WINDOW_MS + 20)));
    }

    #[test]
    fn test_assist_trigger() {
        let mut c = Correlator::new(PRESENCE_DETECT_DURATION, MOTION_TIMER_DURATION, 60);
        let mut sink = RecordingSink::default();
        c.door_opening(Millis(0));
        c.presence_changed(true, Millis(100), &mut sink);
        assert!(sink.take().contains(&VehicleEvent::Assist(60_000)));

        c.set_assist_duration_s(0);
        c.door_opening(Millis(200));
        c.presence_changed(false, Millis(300), &mut sink);
        c.door_opening(Millis(400));
        c.presence_changed(true, Millis(500), &mut sink);
        assert!(!sink
            .take()
            .iter()
            .any(|e| matches!(e, VehicleEvent::Assist(_))));
    }

    #[test]
    fn test_status_change_flag() {
        let (mut c, mut sink) = setup();
        assert!(!c.take_status_change());
        c.presence_changed(true, Millis(0), &mut sink);
        assert!(c.take_status_change());
        assert!(!c.take_status_change());
    }
}

//! MSC-timestamp jump corrector (C6).
//!
//! `MSC_TIMESTAMP` free-runs at the kernel's microsecond clock independent of
//! wall time; a sleeping touchpad controller that wakes up reports a huge gap
//! there while the `SYN_REPORT`-driven `time` field barely moves. Left alone
//! this reads as a teleport. This corrector recognizes the gap from the first
//! couple of `MSC_TIMESTAMP` values and retimes history so it reads as one
//! long, ordinary interval instead.

use crate::touch::Touch;

const EXPECT_FIRST_MAX_US: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    ExpectFirst,
    ExpectDelay {
        interval: u64,
    },
    Ignore,
}

/// Per-device MSC-timestamp state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampCorrector {
    state: State,
}

impl TimestampCorrector {
    /// Feeds one `MSC_TIMESTAMP` value alongside the frame's `time` (µs).
    /// Returns the timestamp (µs) the pointer-accel filter should restart at,
    /// if a jump was just corrected.
    pub fn on_msc_timestamp(&mut self, msc_now: u64, time: u64, touches: &mut [Touch]) -> Option<u64> {
        if msc_now == 0 {
            self.state = State::ExpectFirst;
            return None;
        }

        match self.state {
            State::ExpectFirst => {
                self.state = if msc_now > EXPECT_FIRST_MAX_US {
                    State::Ignore
                } else {
                    State::ExpectDelay { interval: msc_now }
                };
                None
            }
            State::ExpectDelay { interval } => {
                // Only the single frame immediately following the latched
                // interval is evaluated; whether or not it is a jump, later
                // frames must not be re-checked against the same interval,
                // since ordinary cadence alone would eventually exceed
                // `2 * interval` and falsely read as a jump.
                self.state = State::Ignore;
                if msc_now > 2 * interval {
                    let tdelta = msc_now - interval;
                    for touch in touches.iter_mut() {
                        touch.history.rewrite_timestamps(|i, _old| {
                            time.saturating_sub(tdelta).saturating_sub(interval * i as u64)
                        });
                    }
                    Some(time.saturating_sub(tdelta))
                } else {
                    None
                }
            }
            State::Ignore => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::Point;

    #[test]
    fn absorbs_sleep_gap_and_restarts_filter_once() {
        let mut corrector = TimestampCorrector::default();
        let mut touches = [Touch::new(0)];
        touches[0].begin_contact(0, Point::new(0, 0));
        touches[0].history.push(Point::new(1, 1), 100);

        assert_eq!(corrector.on_msc_timestamp(0, 0, &mut touches), None);
        assert_eq!(corrector.on_msc_timestamp(7_300, 7_300, &mut touches), None);
        let restart = corrector.on_msc_timestamp(123_456, 130_756, &mut touches);
        assert!(restart.is_some());

        // Once in IGNORE, further large gaps do nothing more.
        assert_eq!(corrector.on_msc_timestamp(500_000, 500_000, &mut touches), None);
    }

    #[test]
    fn ordinary_cadence_never_triggers_correction() {
        let mut corrector = TimestampCorrector::default();
        let mut touches = [Touch::new(0)];
        assert_eq!(corrector.on_msc_timestamp(0, 0, &mut touches), None);
        assert_eq!(corrector.on_msc_timestamp(8_000, 8_000, &mut touches), None);
        assert_eq!(corrector.on_msc_timestamp(16_000, 16_000, &mut touches), None);
        assert_eq!(corrector.on_msc_timestamp(24_000, 24_000, &mut touches), None);
    }

    #[test]
    fn first_interval_over_20ms_goes_straight_to_ignore() {
        let mut corrector = TimestampCorrector::default();
        let mut touches: [Touch; 0] = [];
        assert_eq!(corrector.on_msc_timestamp(0, 0, &mut touches), None);
        assert_eq!(corrector.on_msc_timestamp(25_000, 25_000, &mut touches), None);
        // Even a huge subsequent gap is inert in IGNORE.
        assert_eq!(corrector.on_msc_timestamp(900_000, 900_000, &mut touches), None);
    }
}

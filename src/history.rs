//! Hysteresis and wobble detection (C4). The ring buffer itself lives
//! on [`crate::touch::Touch::history`]; this module covers the jitter
//! suppression built on top of it.

use crate::touch::{Hysteresis, Point};

/// Per-axis hysteresis margin, in device units: axis fuzz if nonzero, else
/// `resolution / 4`.
#[derive(Debug, Clone, Copy)]
pub struct Margin {
    pub mx: i32,
    pub my: i32,
}

impl Margin {
    pub fn from_axis(fuzz_x: i32, resolution_x: i32, fuzz_y: i32, resolution_y: i32) -> Self {
        Self {
            mx: if fuzz_x != 0 { fuzz_x } else { resolution_x / 4 },
            my: if fuzz_y != 0 { fuzz_y } else { resolution_y / 4 },
        }
    }
}

/// Applies the hysteresis margin to `point`, updating `hysteresis.center` in
/// place. If `|delta| < margin` on an axis the reported coordinate does not
/// move on that axis at all; otherwise the excess beyond the margin carries
/// through.
pub fn apply(hysteresis: &mut Hysteresis, point: Point, margin: Margin) -> Point {
    let dx = point.x - hysteresis.center.x;
    let dy = point.y - hysteresis.center.y;

    let out_x = if dx.abs() < margin.mx {
        hysteresis.center.x
    } else {
        point.x - margin.mx * dx.signum()
    };
    let out_y = if dy.abs() < margin.my {
        hysteresis.center.y
    } else {
        point.y - margin.my * dy.signum()
    };

    let out = Point::new(out_x, out_y);
    hysteresis.center = out;
    out
}

const WOBBLE_MAX_INTERVAL_US: u64 = 40_000;
const WOBBLE_PATTERN: u8 = 0b101;

/// Feeds one single-finger motion delta into the wobble detector's 3-bit
/// shift register. Returns `true` the frame the `0b101` pattern completes,
/// meaning hysteresis should be auto-enabled for this device.
pub fn feed_wobble(hysteresis: &mut Hysteresis, dx: i32, dy: i32, dt_us: u64) -> bool {
    if dt_us > WOBBLE_MAX_INTERVAL_US {
        hysteresis.x_motion_history = 0;
        return false;
    }
    if dy != 0 && dx == 0 {
        hysteresis.x_motion_history = 0;
        return false;
    }
    if dx == 0 {
        return false;
    }

    let bit = u8::from(dx > 0);
    hysteresis.x_motion_history = ((hysteresis.x_motion_history << 1) | bit) & 0b111;
    hysteresis.x_motion_history == WOBBLE_PATTERN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_deltas_keep_point_constant() {
        let margin = Margin { mx: 5, my: 5 };
        let mut hysteresis = Hysteresis {
            center: Point::new(100, 100),
            x_motion_history: 0,
        };
        for p in [Point::new(102, 101), Point::new(103, 98), Point::new(101, 99)] {
            let out = apply(&mut hysteresis, p, margin);
            assert_eq!(out, Point::new(100, 100));
        }
    }

    #[test]
    fn large_delta_carries_excess_through() {
        let margin = Margin { mx: 5, my: 5 };
        let mut hysteresis = Hysteresis {
            center: Point::new(100, 100),
            x_motion_history: 0,
        };
        let out = apply(&mut hysteresis, Point::new(120, 100), margin);
        assert_eq!(out, Point::new(115, 100));
        assert_eq!(hysteresis.center, out);
    }

    #[test]
    fn wobble_pattern_0b101_triggers() {
        let mut hysteresis = Hysteresis::default();
        assert!(!feed_wobble(&mut hysteresis, 1, 0, 1000)); // bit 1 -> 0b001
        assert!(!feed_wobble(&mut hysteresis, -1, 0, 1000)); // bit 0 -> 0b010
        assert!(feed_wobble(&mut hysteresis, 1, 0, 1000)); // bit 1 -> 0b101
    }

    #[test]
    fn wobble_interrupted_by_slow_interval() {
        let mut hysteresis = Hysteresis::default();
        feed_wobble(&mut hysteresis, 1, 0, 1000);
        feed_wobble(&mut hysteresis, -1, 0, 1000);
        assert!(!feed_wobble(&mut hysteresis, 1, 0, 41_000));
        assert_eq!(hysteresis.x_motion_history, 0);
    }
}

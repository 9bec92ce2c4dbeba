//! Palm classifier (C7).
//!
//! An ordered list of `(predicate, result_state)` rules evaluated until the
//! first match, per the design notes' recommended shape for this chain of
//! predicates — except pressure, which is re-checked once more at the end so
//! a sticky pressure latch can still apply after the other rules run.

use crate::touch::{PalmState, Point, Touch};

/// Physical geometry needed by the edge-exclusion rule, resolved once at
/// device init from the axis' resolution and the quirks database.
#[derive(Debug, Clone, Copy)]
pub struct EdgeGeometry {
    pub width_units: i32,
    pub height_units: i32,
    pub width_mm: f64,
    pub height_mm: f64,
    pub has_software_top_buttons: bool,
    pub is_clickpad: bool,
}

impl EdgeGeometry {
    fn units_per_mm_x(&self) -> f64 {
        self.width_units as f64 / self.width_mm
    }

    fn units_per_mm_y(&self) -> f64 {
        self.height_units as f64 / self.height_mm
    }

    fn side_band_units(&self) -> i32 {
        let mm = (self.width_mm * 0.08).min(8.0);
        (mm * self.units_per_mm_x()).round() as i32
    }

    /// `None` when the top band does not apply (software top buttons present,
    /// or the touchpad is too short for the 55mm cutoff).
    fn top_band_units(&self) -> Option<i32> {
        if self.has_software_top_buttons || self.height_mm <= 55.0 {
            return None;
        }
        let mm = self.height_mm * 0.05;
        Some((mm * self.units_per_mm_y()).round() as i32)
    }

    /// Returns `Some(is_side)` if `point` falls in an exclusion band, `None`
    /// otherwise.
    fn band_at(&self, point: Point) -> Option<bool> {
        let side = self.side_band_units();
        if point.x < side {
            return Some(true);
        }
        if point.x > self.width_units - side && !self.is_clickpad {
            return Some(true);
        }
        if let Some(top) = self.top_band_units() {
            if point.y < top {
                return Some(false);
            }
        }
        None
    }
}

const EDGE_RELEASE_WINDOW_US: u64 = 200_000;

/// Whatever owns the clickpad's software-button layout (the button
/// collaborator) implements this so the edge rule can consult it without
/// the palm classifier depending on the button module's full interface.
pub trait SoftButtonArea {
    fn is_inside_softbutton_area(&self, point: Point) -> bool;
}

/// Everything the classifier needs that is not already on the `Touch` it is
/// evaluating. Constructed once per dirty touch by the pipeline orchestrator.
///
/// Owns its data rather than borrowing `Device` (unlike `ThumbContext`'s
/// sibling it mirrors in shape): the orchestrator calls `palm::evaluate`
/// with `&mut self.touches[slot]` while this context is alive, so a
/// `PalmContext<'a>` borrowing `*self` would hold a shared borrow of the
/// whole device across that mutable borrow of one of its fields. `geometry`
/// is `Copy`, and the softbutton-area query is resolved to a plain `bool`
/// by the caller (who already knows which point to ask about) instead of
/// carrying a `&dyn SoftButtonArea`.
pub struct PalmContext {
    pub pressure_threshold: i32,
    pub size_threshold: i32,
    pub arbitration_pending: bool,
    pub dwt_typing_active: bool,
    pub last_keypress_time: u64,
    pub trackpoint_active: bool,
    pub geometry: EdgeGeometry,
    pub in_softbutton_area: bool,
    /// Whether some other touch on the device is currently active and not
    /// itself classified as palm (releases the edge rule).
    pub other_active_non_palm_touch: bool,
}

/// Evaluate one dirty touch's palm classification for this frame.
/// `is_begin` marks the frame the touch transitioned out of `Hovering`.
///
/// True first-match-wins over rules 1-7 in priority order: once a rule
/// claims the state for this call, no lower-priority rule may touch it,
/// enforced by the `matched` flag guarding every block below. `Pressure`
/// and `TouchSize` are additionally sticky (§8 invariant #3): once entered,
/// `matched` is set from the current state alone, before any other rule
/// even runs, and nothing below ever clears them — only the touch ending
/// does. Rule 1 (pressure) is, per spec, re-checked once more at the very
/// end regardless of which rule otherwise won, so a latch that newly
/// applies still takes effect this frame.
pub fn evaluate(touch: &mut Touch, is_begin: bool, ctx: &PalmContext) {
    check_pressure(touch, ctx);
    let mut matched = matches!(touch.palm.state, PalmState::Pressure | PalmState::TouchSize);

    if !matched {
        if ctx.arbitration_pending {
            touch.palm.state = PalmState::Arbitration;
            matched = true;
        } else if touch.palm.state == PalmState::Arbitration {
            touch.palm.state = PalmState::None;
        }
    }

    if !matched {
        if is_begin && ctx.dwt_typing_active {
            touch.palm.state = PalmState::Typing;
            matched = true;
        } else if touch.palm.state == PalmState::Typing {
            if !ctx.dwt_typing_active && touch.time > ctx.last_keypress_time {
                touch.palm.state = PalmState::None;
            } else {
                matched = true;
            }
        }
    }

    if !matched {
        if is_begin && ctx.trackpoint_active {
            touch.palm.state = PalmState::Trackpoint;
            matched = true;
        } else if touch.palm.state == PalmState::Trackpoint {
            if ctx.trackpoint_active {
                matched = true;
            } else {
                touch.palm.state = PalmState::None;
            }
        }
    }

    if !matched {
        if touch.is_tool_palm {
            touch.palm.state = PalmState::ToolPalm;
            matched = true;
        } else if touch.palm.state == PalmState::ToolPalm {
            touch.palm.state = PalmState::None;
        }
    }

    if !matched && (touch.major.unwrap_or(0) > ctx.size_threshold || touch.minor.unwrap_or(0) > ctx.size_threshold) {
        touch.palm.state = PalmState::TouchSize;
        matched = true;
    }

    if !matched {
        if is_begin {
            if let Some(is_side) = ctx.geometry.band_at(touch.point) {
                if !ctx.in_softbutton_area {
                    touch.palm.state = PalmState::Edge;
                    touch.palm.first = touch.point;
                    touch.palm.time = touch.time;
                    touch.palm.edge_is_side = is_side;
                }
            }
        } else if touch.palm.state == PalmState::Edge
            && (ctx.other_active_non_palm_touch
                || (touch.time.saturating_sub(touch.palm.time) <= EDGE_RELEASE_WINDOW_US
                    && exits_in_clearing_direction(touch.palm.first, touch.point, touch.palm.edge_is_side)))
        {
            touch.palm.state = PalmState::None;
        }
    }

    // Rule 8: pressure re-checked last regardless of which rule above won.
    check_pressure(touch, ctx);
}

fn check_pressure(touch: &mut Touch, ctx: &PalmContext) {
    if touch.pressure.unwrap_or(0) > ctx.pressure_threshold {
        touch.palm.state = PalmState::Pressure;
    }
}

/// A side-band palm clears by moving within ±45° of horizontal; a top-band
/// palm clears by moving downward within ±45° of straight down.
fn exits_in_clearing_direction(first: Point, current: Point, is_side: bool) -> bool {
    let (dx, dy) = current.delta(first);
    if dx == 0 && dy == 0 {
        return false;
    }
    if is_side {
        dx.unsigned_abs() >= dy.unsigned_abs()
    } else {
        dy > 0 && dy.unsigned_abs() >= dx.unsigned_abs()
    }
}

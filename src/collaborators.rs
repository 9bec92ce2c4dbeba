//! External collaborator interfaces.
//!
//! The dispatcher core never implements acceleration curves, tap-to-click,
//! button semantics, edge/two-finger scrolling or gesture recognition
//! itself — it calls out to these traits, routing side effects through a
//! narrow client/command interface rather than inlining them.

use thiserror::Error;

use crate::palm::SoftButtonArea;
use crate::touch::Touch;

/// Errors a collaborator call can surface: a small, closed enum rather than
/// a catch-all `anyhow::Error`.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("collaborator is not initialized for this device")]
    NotInitialized,
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

/// One thing the dispatcher wants to emit this frame. The pipeline
/// orchestrator accumulates these into a `Vec` per frame and hands them to
/// whatever sink `main.rs` wires up (a `uinput` virtual device, a test
/// harness, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    Motion { dx_mm: f64, dy_mm: f64 },
    Button { code: u16, pressed: bool },
    Scroll { dx_mm: f64, dy_mm: f64 },
    GestureBegin,
    GestureEnd,
}

/// Context passed to the acceleration filter: enough to pick the right
/// curve without the filter reaching back into device internals.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub time_us: u64,
    pub nfingers_down: u8,
}

/// Pointer acceleration. The Bluetooth-vs-wired question is resolved by not
/// special-casing it here at all: one filter instance is selected once at
/// device init and used unconditionally (see `DESIGN.md`).
pub trait AccelFilter {
    fn dispatch(&mut self, dx_mm: f64, dy_mm: f64, ctx: FilterContext) -> (f64, f64);
    fn dispatch_constant(&mut self, dx_mm: f64, dy_mm: f64, ctx: FilterContext) -> (f64, f64);
    fn restart(&mut self, at_time_us: u64);
}

pub trait TapHandler {
    /// Returns `true` if tap processing wants pointer motion suppressed this
    /// frame.
    fn handle_state(&mut self, touches: &[Touch], time_us: u64) -> bool;
    fn post_process_state(&mut self, touches: &[Touch], time_us: u64);
    fn suspend(&mut self);
    fn resume(&mut self);
    fn remove_all(&mut self);
}

/// Also a [`SoftButtonArea`], so the palm classifier can query the same
/// button geometry without the dispatcher core depending on the full button
/// collaborator interface.
pub trait ButtonHandler: SoftButtonArea {
    /// Returns `true` if button processing wants pointer motion suppressed
    /// this frame.
    fn handle_state(&mut self, touches: &[Touch], time_us: u64) -> bool;
    fn post_events(&mut self, out: &mut Vec<OutputEvent>);
    fn release_all(&mut self);
    fn touch_active(&self) -> bool;
    /// Called on device-arbitration transitions for devices with
    /// software top buttons: `true` on entering suspend (enlarge the top
    /// band to 3x so the trackpoint buttons stay reachable), `false` on
    /// full resume.
    fn enlarge_top_button_area(&mut self, enlarged: bool);
}

pub trait EdgeScroll {
    fn init(&mut self, enabled: bool);
    fn handle_state(&mut self, touches: &[Touch], time_us: u64);
    fn post_events(&mut self, out: &mut Vec<OutputEvent>);
    fn stop_events(&mut self);
    fn touch_active(&self) -> bool;
}

pub trait Gesture {
    fn handle_state(&mut self, touches: &[Touch], time_us: u64);
    fn post_events(&mut self, out: &mut Vec<OutputEvent>);
    fn cancel(&mut self);
    fn stop_twofinger_scroll(&mut self);
}

/// A scheduled one-shot timer handle. `id` is opaque to the dispatcher; the
/// concrete timer service assigns it.
pub trait TimerService {
    type TimerId: Copy + Eq;

    fn timer_init(&mut self, name: &'static str) -> Self::TimerId;
    fn timer_set(&mut self, id: Self::TimerId, deadline_us: u64);
    fn timer_cancel(&mut self, id: Self::TimerId);
    fn timer_destroy(&mut self, id: Self::TimerId);
}

pub mod noop {
    //! No-op stand-ins used by the demo binary and by tests that only care
    //! about the dispatcher's own state transitions, not a real gesture
    //! engine or accel curve.
    use super::*;

    #[derive(Debug, Default)]
    pub struct NoopAccelFilter;

    impl AccelFilter for NoopAccelFilter {
        fn dispatch(&mut self, dx_mm: f64, dy_mm: f64, _ctx: FilterContext) -> (f64, f64) {
            (dx_mm, dy_mm)
        }
        fn dispatch_constant(&mut self, dx_mm: f64, dy_mm: f64, _ctx: FilterContext) -> (f64, f64) {
            (dx_mm, dy_mm)
        }
        fn restart(&mut self, _at_time_us: u64) {}
    }

    #[derive(Debug, Default)]
    pub struct NoopTap;

    impl TapHandler for NoopTap {
        fn handle_state(&mut self, _touches: &[Touch], _time_us: u64) -> bool {
            false
        }
        fn post_process_state(&mut self, _touches: &[Touch], _time_us: u64) {}
        fn suspend(&mut self) {}
        fn resume(&mut self) {}
        fn remove_all(&mut self) {}
    }

    #[derive(Debug, Default)]
    pub struct NoopButton;

    impl SoftButtonArea for NoopButton {
        fn is_inside_softbutton_area(&self, _point: crate::touch::Point) -> bool {
            false
        }
    }

    impl ButtonHandler for NoopButton {
        fn handle_state(&mut self, _touches: &[Touch], _time_us: u64) -> bool {
            false
        }
        fn post_events(&mut self, _out: &mut Vec<OutputEvent>) {}
        fn release_all(&mut self) {}
        fn touch_active(&self) -> bool {
            false
        }
        fn enlarge_top_button_area(&mut self, _enlarged: bool) {}
    }

    #[derive(Debug, Default)]
    pub struct NoopEdgeScroll;

    impl EdgeScroll for NoopEdgeScroll {
        fn init(&mut self, _enabled: bool) {}
        fn handle_state(&mut self, _touches: &[Touch], _time_us: u64) {}
        fn post_events(&mut self, _out: &mut Vec<OutputEvent>) {}
        fn stop_events(&mut self) {}
        fn touch_active(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    pub struct NoopGesture;

    impl Gesture for NoopGesture {
        fn handle_state(&mut self, _touches: &[Touch], _time_us: u64) {}
        fn post_events(&mut self, _out: &mut Vec<OutputEvent>) {}
        fn cancel(&mut self) {}
        fn stop_twofinger_scroll(&mut self) {}
    }

    /// A min-heap-backed timer service would replace this in a full daemon;
    /// the demo binary and tests only need to track deadlines, not actually
    /// race them against an event loop.
    #[derive(Debug, Default)]
    pub struct NoopTimerService {
        next_id: u32,
        deadlines: std::collections::HashMap<u32, Option<u64>>,
    }

    impl TimerService for NoopTimerService {
        type TimerId = u32;

        fn timer_init(&mut self, _name: &'static str) -> Self::TimerId {
            let id = self.next_id;
            self.next_id += 1;
            self.deadlines.insert(id, None);
            id
        }

        fn timer_set(&mut self, id: Self::TimerId, deadline_us: u64) {
            self.deadlines.insert(id, Some(deadline_us));
        }

        fn timer_cancel(&mut self, id: Self::TimerId) {
            self.deadlines.insert(id, None);
        }

        fn timer_destroy(&mut self, id: Self::TimerId) {
            self.deadlines.remove(&id);
        }
    }
}

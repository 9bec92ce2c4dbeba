//! Frame decoder (C1).
//!
//! Same match-based decode loop and dirty-tracking-until-`SYN_REPORT`
//! design as a single-touch screen decoder, generalized from a single
//! normalized touch index to the full multi-touch slot protocol this crate
//! needs (`ABS_MT_SLOT`, per-slot tracking IDs, pressure/size/tool-type, and
//! the `BTN_TOOL_*` fake-finger bits).

use std::collections::HashMap;

use evdev::{AbsInfo, AbsoluteAxisCode, EventSummary, InputEvent, KeyCode, MiscCode, SynchronizationCode};

use crate::fake_finger::{FakeFingerTracker, ToolBit};
use crate::touch::{Point, Touch};

/// `ABS_MT_TOOL_TYPE` value for a palm contact (`MT_TOOL_PALM`, see
/// `linux/input-event-codes.h`).
const MT_TOOL_PALM: i32 = 2;

/// What happened this event, as far as the pipeline orchestrator is
/// concerned. Most events just mutate a `Touch` in place and produce
/// `Continue`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedFrame {
    Continue,
    /// `SYN_REPORT`: the frame is complete, run the pipeline.
    SynReport,
    /// `MSC_TIMESTAMP`, forwarded to the jump corrector (C6).
    MscTimestamp(u32),
    /// A physical button (`BTN_LEFT/MIDDLE/RIGHT`, `BTN_0/1/2`) changed state.
    Button { code: u16, pressed: bool },
}

/// Decodes one physical device's raw event stream into per-slot `Touch`
/// mutations. Holds only the axis metadata needed to interpret values and
/// the currently-selected `ABS_MT_SLOT`; it owns no touch state itself.
pub struct FrameDecoder {
    axes_info: HashMap<AbsoluteAxisCode, AbsInfo>,
    current_slot: usize,
    /// Devices without `ABS_MT_SLOT` report a single implicit contact.
    is_single_touch: bool,
    /// `left_handed.enabled && left_handed.rotate`: both axes are
    /// reported as `max - (value - min)`.
    rotate_left_handed: bool,
}

impl FrameDecoder {
    pub fn new(axes_info: HashMap<AbsoluteAxisCode, AbsInfo>) -> Self {
        let is_single_touch = !axes_info.contains_key(&AbsoluteAxisCode::ABS_MT_SLOT);
        Self {
            axes_info,
            current_slot: 0,
            is_single_touch,
            rotate_left_handed: false,
        }
    }

    pub fn set_left_handed_rotate(&mut self, enabled: bool) {
        self.rotate_left_handed = enabled;
    }

    fn rotate(&self, axis: AbsoluteAxisCode, value: i32) -> i32 {
        if !self.rotate_left_handed {
            return value;
        }
        match self.axes_info.get(&axis) {
            Some(info) => info.maximum() - (value - info.minimum()),
            None => value,
        }
    }

    pub fn axis_info(&self, axis: AbsoluteAxisCode) -> Option<&AbsInfo> {
        self.axes_info.get(&axis)
    }

    /// Applies one decoded event to `touches`, mutating the addressed slot
    /// in place. `time_us` is the frame's monotonic timestamp, already
    /// extracted from the event by the caller; timestamps are assumed
    /// monotonically non-decreasing within a device.
    pub fn apply_event(
        &mut self,
        event: InputEvent,
        time_us: u64,
        touches: &mut [Touch],
        fake_fingers: &mut FakeFingerTracker,
    ) -> DecodedFrame {
        log::trace!("decoding event: {event:?}");

        match event.destructure() {
            EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
                return DecodedFrame::SynReport;
            }

            EventSummary::Misc(_, MiscCode::MSC_TIMESTAMP, value) => {
                return DecodedFrame::MscTimestamp(value as u32);
            }

            // BTN_TOUCH and the BTN_TOOL_* finger-count bits feed the
            // fake-finger tracker (C2) directly; they never touch slot data.
            EventSummary::Key(_, KeyCode::BTN_TOUCH, value) => {
                fake_fingers.apply(ToolBit::Touch, value != 0);
            }
            EventSummary::Key(_, KeyCode::BTN_TOOL_FINGER, value) => {
                fake_fingers.apply(ToolBit::Finger, value != 0);
            }
            EventSummary::Key(_, KeyCode::BTN_TOOL_DOUBLETAP, value) => {
                fake_fingers.apply(ToolBit::DoubleTap, value != 0);
            }
            EventSummary::Key(_, KeyCode::BTN_TOOL_TRIPLETAP, value) => {
                fake_fingers.apply(ToolBit::TripleTap, value != 0);
            }
            EventSummary::Key(_, KeyCode::BTN_TOOL_QUADTAP, value) => {
                fake_fingers.apply(ToolBit::QuadTap, value != 0);
            }
            EventSummary::Key(_, KeyCode::BTN_TOOL_QUINTTAP, value) => {
                fake_fingers.apply(ToolBit::QuintTap, value != 0);
            }

            EventSummary::Key(_, code @ (KeyCode::BTN_LEFT | KeyCode::BTN_MIDDLE | KeyCode::BTN_RIGHT), value)
            | EventSummary::Key(_, code @ (KeyCode::BTN_0 | KeyCode::BTN_1 | KeyCode::BTN_2), value) => {
                return DecodedFrame::Button { code: code.0, pressed: value != 0 };
            }

            // Selects which slot subsequent ABS_MT_* events address, clamped
            // to the last valid slot so an out-of-range index from the
            // kernel never silently drops the events that follow it.
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_SLOT, value) => {
                let max_slot = touches.len().saturating_sub(1);
                self.current_slot = (value as usize).min(max_slot);
            }

            // Lifted: ABS_MT_TRACKING_ID goes to -1.
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    touch.schedule_end();
                    touch.dirty = true;
                }
            }
            // Landed: a fresh, non-negative tracking ID.
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TRACKING_ID, _id) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    let point = touch.point;
                    touch.begin_contact(time_us, point);
                    touch.dirty = true;
                }
            }

            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_POSITION_X, value) => {
                let value = self.rotate(AbsoluteAxisCode::ABS_MT_POSITION_X, value);
                self.update_point(touches, self.current_slot, time_us, |p| p.x = value);
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_POSITION_Y, value) => {
                let value = self.rotate(AbsoluteAxisCode::ABS_MT_POSITION_Y, value);
                self.update_point(touches, self.current_slot, time_us, |p| p.y = value);
            }
            // Single-touch devices report position without a slot at all.
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_X, value) if self.is_single_touch => {
                let value = self.rotate(AbsoluteAxisCode::ABS_X, value);
                self.update_point(touches, 0, time_us, |p| p.x = value);
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_Y, value) if self.is_single_touch => {
                let value = self.rotate(AbsoluteAxisCode::ABS_Y, value);
                self.update_point(touches, 0, time_us, |p| p.y = value);
            }

            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_PRESSURE, value) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    touch.pressure = Some(value);
                    touch.dirty = true;
                }
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_PRESSURE, value) if self.is_single_touch => {
                if let Some(touch) = touches.get_mut(0) {
                    touch.pressure = Some(value);
                    touch.dirty = true;
                }
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TOUCH_MAJOR, value) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    touch.major = Some(value);
                    touch.dirty = true;
                }
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TOUCH_MINOR, value) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    touch.minor = Some(value);
                    touch.dirty = true;
                }
            }
            EventSummary::AbsoluteAxis(_, AbsoluteAxisCode::ABS_MT_TOOL_TYPE, value) => {
                if let Some(touch) = touches.get_mut(self.current_slot) {
                    touch.is_tool_palm = value == MT_TOOL_PALM;
                    touch.dirty = true;
                }
            }

            _ => {}
        }

        DecodedFrame::Continue
    }

    fn update_point(&self, touches: &mut [Touch], slot: usize, time_us: u64, f: impl FnOnce(&mut Point)) {
        if let Some(touch) = touches.get_mut(slot) {
            f(&mut touch.point);
            touch.time = time_us;
            touch.dirty = true;
        }
    }
}

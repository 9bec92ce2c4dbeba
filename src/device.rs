//! Pipeline orchestrator and per-device aggregate root (C11).
//!
//! The outermost per-physical-device struct owning sub-state, one struct
//! wiring together all eleven touchpad components.

use std::collections::HashMap;

use evdev::{AbsInfo, AbsoluteAxisCode, InputEvent};

use crate::arbitration::{Arbitration, SuspendReason, Transition as ArbitrationTransition};
use crate::collaborators::{AccelFilter, ButtonHandler, EdgeScroll, FilterContext, Gesture, OutputEvent, TapHandler};
use crate::dwt::Dwt;
use crate::fake_finger::FakeFingerTracker;
use crate::frame::{DecodedFrame, FrameDecoder};
use crate::history::{self, Margin};
use crate::hover::{self, HoverResolver};
use crate::jump::{self, JumpOutcome};
use crate::palm::{self, EdgeGeometry, PalmContext, SoftButtonArea};
use crate::thumb::{self, ThumbContext, ThumbGeometry};
use crate::timestamp::TimestampCorrector;
use crate::touch::{Touch, TouchState};

/// Everything about the physical device and its configuration that the
/// pipeline needs but that isn't itself part of a single touch's state.
/// Built once at device init from axis metadata, the quirks database and
/// the runtime configuration surface.
pub struct DeviceGeometry {
    pub units_per_mm_x: f64,
    pub units_per_mm_y: f64,
    pub is_clickpad: bool,
    /// Jump detection is disabled entirely on Wacom-tagged devices.
    pub is_wacom: bool,
    pub edge: EdgeGeometry,
    pub thumb: ThumbGeometry,
    pub touchpad_height_mm: f64,
    /// Real `ABS_MT_SLOT` count the kernel reports. On semi-mt and
    /// single-slot devices this is smaller than `touches.len()`
    /// (`ntouches = max(num_slots, btn_tool_max)`); slots at and beyond this
    /// index only ever exist to satisfy a `BTN_TOOL_*` finger count the
    /// hardware's real slots can't carry coordinates for.
    pub real_slot_count: usize,
}

/// The subset of the configuration table the pipeline reads every frame.
pub struct RuntimeConfig {
    pub dwt_enabled: bool,
    pub scroll_method_is_edge: bool,
    pub two_finger_scroll_enabled: bool,
    pub detect_thumbs: bool,
    pub pressure_threshold: i32,
    pub size_threshold: i32,
    pub speed_threshold_mm_s: f64,
}

/// Ties every component (C1-C10) together behind the pipeline.
pub struct Device<A, T, B, E, G> {
    decoder: FrameDecoder,
    touches: Vec<Touch>,
    fake_fingers: FakeFingerTracker,
    hover: HoverResolver,
    timestamp_corrector: TimestampCorrector,
    arbitration: Arbitration,
    dwt: Dwt,
    geometry: DeviceGeometry,
    config: RuntimeConfig,
    hysteresis_enabled: bool,
    margin: Margin,

    accel: A,
    tap: T,
    button: B,
    edge_scroll: E,
    gesture: G,

    old_nfingers_down: usize,
    pending_msc: Option<u64>,
    pending_buttons: Vec<(u16, bool)>,
    pending_motion: Option<(f64, f64)>,
    trackpoint_active: bool,
    /// Timestamp of the most recent paired-keyboard key-down, regardless of
    /// whether it was a modifier or DWT-relevant key. Feeds the palm
    /// classifier's "touch began strictly after the last keypress" release
    /// condition (§4.7 rule 3).
    last_keypress_time: u64,
}

impl<A, T, B, E, G> Device<A, T, B, E, G>
where
    A: AccelFilter,
    T: TapHandler,
    B: ButtonHandler,
    E: EdgeScroll,
    G: Gesture,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axes_info: HashMap<AbsoluteAxisCode, AbsInfo>,
        num_slots: usize,
        hover: HoverResolver,
        geometry: DeviceGeometry,
        config: RuntimeConfig,
        margin: Margin,
        accel: A,
        tap: T,
        button: B,
        edge_scroll: E,
        gesture: G,
    ) -> Self {
        let mut touches = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            touches.push(Touch::new(slot));
        }
        let has_software_top_buttons = geometry.edge.has_software_top_buttons;

        Self {
            decoder: FrameDecoder::new(axes_info),
            touches,
            fake_fingers: FakeFingerTracker::default(),
            hover,
            timestamp_corrector: TimestampCorrector::default(),
            arbitration: Arbitration::new(has_software_top_buttons),
            dwt: Dwt::default(),
            geometry,
            config,
            hysteresis_enabled: false,
            margin,
            accel,
            tap,
            button,
            edge_scroll,
            gesture,
            old_nfingers_down: 0,
            pending_msc: None,
            pending_buttons: Vec::new(),
            pending_motion: None,
            trackpoint_active: false,
            last_keypress_time: 0,
        }
    }

    pub fn set_left_handed_rotate(&mut self, enabled: bool) {
        self.decoder.set_left_handed_rotate(enabled);
    }

    pub fn suspend(&mut self, trigger: SuspendReason) {
        if let ArbitrationTransition::EnteredSuspend { enlarge_top_buttons } = self.arbitration.suspend(trigger) {
            self.button.release_all();
            self.tap.remove_all();
            self.edge_scroll.stop_events();
            self.gesture.cancel();
            if enlarge_top_buttons {
                self.button.enlarge_top_button_area(true);
            }
            self.fake_fingers = FakeFingerTracker::default();
            for touch in self.touches.iter_mut() {
                touch.schedule_end();
                touch.dirty = true;
            }
            self.run_pipeline(0);
        }
    }

    pub fn resume(&mut self, trigger: SuspendReason) {
        if let ArbitrationTransition::FullyResumed = self.arbitration.resume(trigger) {
            self.button.enlarge_top_button_area(false);
        }
    }

    pub fn on_key(&mut self, code: evdev::KeyCode, down: bool, time_us: u64) -> Option<crate::dwt::Action> {
        if down {
            self.last_keypress_time = time_us;
        }
        if !self.config.dwt_enabled {
            return None;
        }
        Some(self.dwt.on_key(code, down))
    }

    pub fn on_dwt_timeout(&mut self) -> crate::dwt::Action {
        self.dwt.on_timeout()
    }

    pub fn set_trackpoint_active(&mut self, active: bool) {
        self.trackpoint_active = active;
    }

    /// Feeds one raw kernel event through the frame decoder; runs the full
    /// pipeline and returns this frame's output events once a `SYN_REPORT`
    /// completes it.
    pub fn handle_event(&mut self, event: InputEvent, time_us: u64) -> Vec<OutputEvent> {
        let outcome = self.decoder.apply_event(event, time_us, &mut self.touches, &mut self.fake_fingers);
        match outcome {
            DecodedFrame::SynReport => self.run_pipeline(time_us),
            DecodedFrame::MscTimestamp(value) => {
                self.pending_msc = Some(value as u64);
                Vec::new()
            }
            DecodedFrame::Button { code, pressed } => {
                self.pending_buttons.push((code, pressed));
                Vec::new()
            }
            DecodedFrame::Continue => Vec::new(),
        }
    }

    fn run_pipeline(&mut self, time_us: u64) -> Vec<OutputEvent> {
        self.pre_process(time_us);
        self.process(time_us);
        let out = self.post_events(time_us);
        self.post_process();
        out
    }

    /// Step 1: C6, C2, C3, then finalize any `MAYBE_END` slots.
    fn pre_process(&mut self, time_us: u64) {
        if let Some(msc) = self.pending_msc.take() {
            if let Some(restart_at) = self.timestamp_corrector.on_msc_timestamp(msc, time_us, &mut self.touches) {
                self.accel.restart(restart_at);
            }
        }

        let fake_count = self.fake_fingers.count() as usize;
        // Synaptics touch-2 resurrection quirk: a high fake count with a
        // slot stuck in MAYBE_END is a kernel-bug recovery, not a real lift.
        if fake_count >= 3 {
            for touch in self.touches.iter_mut() {
                if touch.state == TouchState::MaybeEnd {
                    touch.state = TouchState::Update;
                    touch.dirty = true;
                }
            }
        }
        if matches!(self.hover, HoverResolver::FakeFinger) {
            hover::reconcile_fake_fingers(&mut self.touches, fake_count);
        }

        // ABS_MT_TRACKING_ID == -1 is an unconditional lift regardless of
        // which hover variant is in use: pressure/size can lag or never
        // cross back below their low threshold before the kernel drops the
        // slot.
        for touch in self.touches.iter_mut() {
            if !touch.has_ended {
                continue;
            }
            match touch.state {
                TouchState::Hovering => touch.state = TouchState::None,
                TouchState::Begin | TouchState::Update => touch.state = TouchState::MaybeEnd,
                _ => {}
            }
        }

        for touch in self.touches.iter_mut().filter(|t| t.dirty) {
            if self.hover.resolve(touch) {
                touch.history.reset();
            }
        }

        for touch in self.touches.iter_mut() {
            if touch.state == TouchState::MaybeEnd {
                touch.state = TouchState::End;
                if let Some((point, _)) = touch.history.offset(0) {
                    touch.point = point;
                }
            }
        }
    }

    /// Step 2: per-dirty-slot C5 -> C8 -> C7 -> wobble -> hysteresis ->
    /// history push -> speed update, then the cross-touch thumb rules and
    /// accel-filter restart.
    fn process(&mut self, time_us: u64) {
        let fake_count = self.fake_fingers.count() as usize;
        if fake_count > self.geometry.real_slot_count {
            hover::synthesize_fake_slot_coordinates(&mut self.touches, self.geometry.real_slot_count);
        }

        let nfingers_down = self.touches.iter().filter(|t| t.is_active()).count();
        if nfingers_down != self.old_nfingers_down {
            for touch in self.touches.iter_mut() {
                touch.history.reset();
            }
        }

        let dirty_active: Vec<usize> = self
            .touches
            .iter()
            .enumerate()
            .filter(|(_, t)| t.dirty && t.is_active())
            .map(|(i, _)| i)
            .collect();

        let mut began_any = false;
        let mut raw_motion: Vec<(usize, f64, f64)> = Vec::new();

        for slot in dirty_active {
            let is_begin = self.touches[slot].state == TouchState::Begin;
            began_any |= is_begin;

            self.run_jump_detector(slot, time_us);

            let thumb_ctx = self.thumb_ctx();
            thumb::evaluate(&mut self.touches[slot], is_begin, &thumb_ctx);

            let other_active_non_palm = self
                .touches
                .iter()
                .enumerate()
                .any(|(i, t)| i != slot && t.is_active() && !t.palm.state.is_palm());
            let in_softbutton_area = self.button.is_inside_softbutton_area(self.touches[slot].point);
            let palm_ctx = self.palm_ctx(other_active_non_palm, in_softbutton_area);
            palm::evaluate(&mut self.touches[slot], is_begin, &palm_ctx);

            self.apply_motion_filtering(slot, time_us);

            let prev = self.touches[slot].history.offset(0);
            let point = self.touches[slot].point;
            let time = self.touches[slot].time;
            self.touches[slot].history.push(point, time);

            let (prev_point, prev_time) = prev.unwrap_or((point, time));
            let (dx, dy) = point.delta(prev_point);
            let dx_mm = dx as f64 / self.geometry.units_per_mm_x;
            let dy_mm = dy as f64 / self.geometry.units_per_mm_y;

            let dt_s = (time.saturating_sub(prev_time)).max(1) as f64 / 1_000_000.0;
            let speed_mm_s = dx_mm.hypot(dy_mm) / dt_s;
            self.touches[slot].speed.record(speed_mm_s, self.config.speed_threshold_mm_s);

            if !is_begin
                && !self.touches[slot].palm.state.is_palm()
                && self.touches[slot].thumb.state != crate::touch::ThumbState::Yes
                && !self.touches[slot].pinned.is_pinned
            {
                raw_motion.push((slot, dx_mm, dy_mm));
            }
        }

        // A physical click on a clickpad pins every active touch to its
        // current point so none of them appear to slide out from under the
        // press while the button is held.
        if self.geometry.is_clickpad && self.pending_buttons.iter().any(|&(_, pressed)| pressed) {
            for touch in self.touches.iter_mut() {
                if touch.is_active() {
                    touch.pinned.is_pinned = true;
                    touch.pinned.center = touch.point;
                }
            }
        }

        let thumb_ctx = self.thumb_ctx();
        thumb::apply_rule_c(&mut self.touches, &thumb_ctx);
        if let Some((fast, new)) = thumb::speed_thumb_pair(&self.touches) {
            thumb::apply_speed_thumb(&mut self.touches, fast, new, &thumb_ctx);
        }

        // Only a single active, non-palm, non-thumb touch drives the
        // pointer; two-or-more-finger motion belongs to edge scroll or
        // gestures instead (handled in post_events via their own traits).
        self.pending_motion = if raw_motion.len() == 1 {
            let (_, dx_mm, dy_mm) = raw_motion[0];
            Some(self.accel_dispatch(dx_mm, dy_mm, time_us))
        } else {
            None
        };

        if began_any {
            self.accel.restart(time_us);
        }
    }

    fn run_jump_detector(&mut self, slot: usize, time_us: u64) {
        if self.geometry.is_wacom {
            return;
        }
        let Some((prev_point, prev_time)) = self.touches[slot].history.offset(0) else {
            return;
        };
        let dt_ms = (time_us.saturating_sub(prev_time)) as f64 / 1000.0;
        let (dx, dy) = self.touches[slot].point.delta(prev_point);
        let dx_mm = dx as f64 / self.geometry.units_per_mm_x;
        let dy_mm = dy as f64 / self.geometry.units_per_mm_y;
        let last_delta_mm = self.touches[slot].jumps.last_delta_mm;

        match jump::detect(dx_mm, dy_mm, dt_ms, last_delta_mm) {
            JumpOutcome::Jump { delta_mm } => {
                self.touches[slot].history.reset();
                self.touches[slot].jumps.last_delta_mm = delta_mm;
            }
            JumpOutcome::Normal { delta_mm } => {
                self.touches[slot].jumps.last_delta_mm = delta_mm;
            }
            JumpOutcome::Skipped => {}
        }
    }

    fn apply_motion_filtering(&mut self, slot: usize, time_us: u64) {
        let active_count = self.touches.iter().filter(|t| t.is_active()).count();
        if active_count != 1 {
            return;
        }

        let touch = &mut self.touches[slot];
        let (dx, dy) = touch.point.delta(touch.hysteresis.center);
        let dt_us = time_us.saturating_sub(touch.time);
        if !self.hysteresis_enabled && history::feed_wobble(&mut touch.hysteresis, dx, dy, dt_us) {
            self.hysteresis_enabled = true;
        }
        if self.hysteresis_enabled {
            touch.point = history::apply(&mut touch.hysteresis, touch.point, self.margin);
        }
    }

    fn palm_ctx(&self, other_active_non_palm_touch: bool, in_softbutton_area: bool) -> PalmContext {
        PalmContext {
            pressure_threshold: self.config.pressure_threshold,
            size_threshold: self.config.size_threshold,
            arbitration_pending: self.arbitration.is_suspended(),
            dwt_typing_active: self.dwt.is_active(),
            last_keypress_time: self.last_keypress_time,
            trackpoint_active: self.trackpoint_active,
            geometry: self.geometry.edge,
            in_softbutton_area,
            other_active_non_palm_touch,
        }
    }

    fn thumb_ctx(&self) -> ThumbContext {
        ThumbContext {
            clickpad_height_mm: self.geometry.touchpad_height_mm,
            detect_thumbs: self.config.detect_thumbs,
            pressure_threshold: self.config.pressure_threshold,
            size_threshold: self.config.size_threshold,
            scroll_method_is_edge: self.config.scroll_method_is_edge,
            two_finger_scroll_enabled: self.config.two_finger_scroll_enabled,
            units_per_mm_x: self.geometry.units_per_mm_x,
            units_per_mm_y: self.geometry.units_per_mm_y,
            geometry: self.geometry.thumb,
        }
    }

    /// Step 3: gate on suspend state, tap/button suppression and
    /// trackpoint/keyboard activity before letting edge scroll or gestures
    /// emit anything.
    fn post_events(&mut self, time_us: u64) -> Vec<OutputEvent> {
        let mut out = Vec::new();

        if self.arbitration.is_suspended() {
            // Physical button presses queued this frame do not leak out
            // while suspended; only the button collaborator's own (e.g.
            // enlarged top-button) events pass through.
            self.pending_buttons.clear();
            self.pending_motion = None;
            self.button.post_events(&mut out);
            return out;
        }

        for (code, pressed) in self.pending_buttons.drain(..) {
            out.push(OutputEvent::Button { code, pressed });
        }

        // Palm-classified touches stop contributing to pointer motion, tap
        // finger counts and gestures, but software buttons and edge
        // scrolling see every touch regardless of palm state.
        let non_palm_active: Vec<Touch> = self.touches.iter().filter(|t| !t.palm.state.is_palm()).cloned().collect();
        let tap_suppress = self.tap.handle_state(&non_palm_active, time_us);
        let button_suppress = self.button.handle_state(&self.touches, time_us);

        if tap_suppress || button_suppress || self.dwt.is_active() || self.trackpoint_active {
            self.pending_motion = None;
            self.edge_scroll.stop_events();
            self.gesture.cancel();
            self.button.post_events(&mut out);
            return out;
        }

        if let Some((dx_mm, dy_mm)) = self.pending_motion.take() {
            out.push(OutputEvent::Motion { dx_mm, dy_mm });
        }

        self.edge_scroll.handle_state(&self.touches, time_us);
        self.edge_scroll.post_events(&mut out);
        self.gesture.handle_state(&non_palm_active, time_us);
        self.gesture.post_events(&mut out);
        self.tap.post_process_state(&non_palm_active, time_us);
        self.button.post_events(&mut out);

        out
    }

    /// Step 4: commit next state, clear dirty/queued, latch nfingers_down.
    fn post_process(&mut self) {
        for touch in self.touches.iter_mut() {
            match touch.state {
                TouchState::Begin => touch.state = TouchState::Update,
                TouchState::End => {
                    touch.state = if touch.has_ended { TouchState::None } else { TouchState::Hovering };
                }
                _ => {}
            }
            if touch.pinned.is_pinned && !touch.is_active() {
                touch.pinned.is_pinned = false;
            }
            touch.dirty = false;
        }
        self.old_nfingers_down = self.touches.iter().filter(|t| t.is_active()).count();
    }

    pub fn touches(&self) -> &[Touch] {
        &self.touches
    }

    fn accel_dispatch(&mut self, dx_mm: f64, dy_mm: f64, time_us: u64) -> (f64, f64) {
        let nfingers_down = self.touches.iter().filter(|t| t.is_active()).count() as u8;
        self.accel.dispatch(dx_mm, dy_mm, FilterContext { time_us, nfingers_down })
    }
}

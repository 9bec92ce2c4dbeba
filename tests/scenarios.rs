//! Crate-level integration tests: drive a `Device` through the raw evdev
//! event sequences a real multi-touch frame would contain and check the
//! high-level output the pipeline produces, rather than any one component
//! in isolation.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use evdev::{AbsInfo, AbsoluteAxisCode, EventType, InputEvent, KeyCode, MiscCode, SynchronizationCode};

use touchpadd::collaborators::noop::{NoopAccelFilter, NoopButton, NoopEdgeScroll, NoopGesture, NoopTap};
use touchpadd::collaborators::{AccelFilter, FilterContext, OutputEvent};
use touchpadd::device::{Device, DeviceGeometry, RuntimeConfig};
use touchpadd::dwt::Action;
use touchpadd::history::Margin;
use touchpadd::hover::HoverResolver;
use touchpadd::palm::EdgeGeometry;
use touchpadd::thumb::ThumbGeometry;
use touchpadd::touch::{PalmState, TouchState};

fn axes_with_slot(num_slots: usize) -> HashMap<AbsoluteAxisCode, AbsInfo> {
    let mut axes = HashMap::new();
    axes.insert(AbsoluteAxisCode::ABS_MT_SLOT, AbsInfo::new(0, 0, num_slots as i32 - 1, 0, 0, 0));
    axes
}

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        dwt_enabled: true,
        scroll_method_is_edge: true,
        two_finger_scroll_enabled: false,
        detect_thumbs: true,
        pressure_threshold: 190,
        size_threshold: 10,
        speed_threshold_mm_s: 150.0,
    }
}

/// `height_mm < 50` keeps the thumb classifier out of scenarios that aren't
/// testing it (it only activates on clickpads `>= 50mm` tall).
fn geometry(width_units: i32, width_mm: f64, height_units: i32, height_mm: f64, is_clickpad: bool) -> DeviceGeometry {
    geometry_with_slots(width_units, width_mm, height_units, height_mm, is_clickpad, usize::MAX)
}

/// Like `geometry`, but lets a test pick a smaller `real_slot_count` than
/// the device's full touch capacity to exercise semi-mt fake-slot
/// synthesis. `usize::MAX` is clamped down by `build_device` to whatever
/// `num_slots` it is actually called with.
fn geometry_with_slots(
    width_units: i32,
    width_mm: f64,
    height_units: i32,
    height_mm: f64,
    is_clickpad: bool,
    real_slot_count: usize,
) -> DeviceGeometry {
    DeviceGeometry {
        units_per_mm_x: width_units as f64 / width_mm,
        units_per_mm_y: height_units as f64 / height_mm,
        is_clickpad,
        is_wacom: false,
        edge: EdgeGeometry {
            width_units,
            height_units,
            width_mm,
            height_mm,
            has_software_top_buttons: false,
            is_clickpad,
        },
        thumb: ThumbGeometry::from_height(height_units),
        touchpad_height_mm: height_mm,
        real_slot_count,
    }
}

type PlainDevice = Device<NoopAccelFilter, NoopTap, NoopButton, NoopEdgeScroll, NoopGesture>;

fn build_device(num_slots: usize, hover: HoverResolver, mut geom: DeviceGeometry) -> PlainDevice {
    geom.real_slot_count = geom.real_slot_count.min(num_slots);
    Device::new(
        axes_with_slot(num_slots),
        num_slots,
        hover,
        geom,
        runtime_config(),
        Margin { mx: 0, my: 0 },
        NoopAccelFilter,
        NoopTap,
        NoopButton,
        NoopEdgeScroll,
        NoopGesture,
    )
}

fn abs(code: AbsoluteAxisCode, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE, code.0, value)
}

fn key(code: KeyCode, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, code.0, value)
}

fn syn() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, SynchronizationCode::SYN_REPORT.0, 0)
}

fn msc_timestamp(value: i32) -> InputEvent {
    InputEvent::new(EventType::MISC, MiscCode::MSC_TIMESTAMP.0, value)
}

/// Feeds every event through `device` at the same frame timestamp and
/// returns whatever the trailing `SYN_REPORT` produced.
fn feed(device: &mut PlainDevice, events: &[InputEvent], time_us: u64) -> Vec<OutputEvent> {
    let mut out = Vec::new();
    for &event in events {
        out = device.handle_event(event, time_us);
    }
    out
}

#[test]
fn single_tap_then_lift_emits_exactly_one_motion_event() {
    let geom = geometry(4000, 100.0, 1600, 40.0, false);
    let mut device = build_device(5, HoverResolver::pressure_quirk(25, 30), geom);

    let frame_a = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 1000),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 1000),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50),
            key(KeyCode::BTN_TOUCH, 1),
            syn(),
        ],
        0,
    );
    assert!(frame_a.is_empty(), "a begin frame never contributes motion: {frame_a:?}");
    assert_eq!(device.touches()[0].state, TouchState::Update);

    let frame_b = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 1050), syn()], 10_000);
    assert_eq!(frame_b, vec![OutputEvent::Motion { dx_mm: 1.25, dy_mm: 0.0 }]);

    let frame_c = feed(
        &mut device,
        &[abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1), key(KeyCode::BTN_TOUCH, 0), syn()],
        20_000,
    );
    assert!(frame_c.is_empty(), "lifting the touch must not emit a trailing motion event: {frame_c:?}");
    assert_eq!(device.touches()[0].state, TouchState::None);
}

#[test]
fn clickpad_click_pins_all_active_touches() {
    let geom = geometry(4000, 100.0, 1600, 40.0, true);
    let mut device = build_device(2, HoverResolver::pressure_quirk(25, 30), geom);

    feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 1000),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 1000),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50),
            key(KeyCode::BTN_TOUCH, 1),
            syn(),
        ],
        0,
    );
    assert!(!device.touches()[0].pinned.is_pinned);

    feed(&mut device, &[key(KeyCode::BTN_LEFT, 1), syn()], 10_000);
    assert!(device.touches()[0].pinned.is_pinned);
    assert_eq!(device.touches()[0].pinned.center, device.touches()[0].point);

    let frame = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 1200), syn()], 20_000);
    assert!(
        frame.iter().all(|e| !matches!(e, OutputEvent::Motion { .. })),
        "a pinned touch must not contribute pointer motion: {frame:?}"
    );

    feed(&mut device, &[key(KeyCode::BTN_LEFT, 0), syn()], 30_000);
    feed(
        &mut device,
        &[abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, -1), key(KeyCode::BTN_TOUCH, 0), syn()],
        40_000,
    );
    assert!(!device.touches()[0].pinned.is_pinned, "unpin must take effect once the touch ends");
}

#[test]
fn semi_mt_fake_slot_inherits_real_slot_coordinates() {
    // A single real slot (`real_slot_count: 1`) plus a second, purely
    // fake slot that only exists to satisfy `BTN_TOOL_DOUBLETAP`'s claimed
    // finger count.
    let geom = geometry_with_slots(4000, 100.0, 1600, 40.0, false, 1);
    let mut device = build_device(2, HoverResolver::FakeFinger, geom);

    feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 1000),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2000),
            key(KeyCode::BTN_TOOL_FINGER, 1),
            syn(),
        ],
        0,
    );
    assert_eq!(device.touches()[0].state, TouchState::Begin);
    assert_eq!(device.touches()[1].state, TouchState::Hovering);

    // The kernel lands a tracking ID on the second slot with no coordinate
    // of its own, then reports two fingers down.
    feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_SLOT, 1),
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 7),
            key(KeyCode::BTN_TOOL_FINGER, 0),
            key(KeyCode::BTN_TOOL_DOUBLETAP, 1),
            syn(),
        ],
        10_000,
    );

    assert_eq!(device.touches()[1].state, TouchState::Begin);
    assert_eq!(
        device.touches()[1].point,
        device.touches()[0].point,
        "a fake slot beyond real_slot_count must inherit the top-most real slot's coordinates"
    );
}

#[test]
fn edge_palm_suppresses_motion_until_it_releases() {
    // A 12mm-wide pad: the side exclusion band is 0.96mm, i.e. 96 device
    // units at this resolution.
    let geom = geometry(1200, 12.0, 6000, 60.0, true);
    let mut device = build_device(2, HoverResolver::pressure_quirk(25, 30), geom);

    let frame_a = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2000),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50),
            syn(),
        ],
        0,
    );
    assert!(frame_a.is_empty());
    assert_eq!(device.touches()[0].palm.state, PalmState::Edge);

    // Movement dominated by the vertical axis does not read as "exiting
    // toward the clearing direction", so the edge classification holds and
    // motion stays suppressed.
    let frame_b = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2050), syn()], 50_000);
    assert!(frame_b.is_empty(), "motion while still classified as edge palm must be suppressed: {frame_b:?}");
    assert_eq!(device.touches()[0].palm.state, PalmState::Edge);

    // A horizontal move within the 200ms window clears the edge palm; motion
    // resumes the same frame it releases.
    let frame_c = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 2000),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2100),
            syn(),
        ],
        150_000,
    );
    assert_eq!(device.touches()[0].palm.state, PalmState::None);
    assert_eq!(frame_c, vec![OutputEvent::Motion { dx_mm: 19.95, dy_mm: 0.5 }]);
}

#[test]
fn a_second_active_touch_clears_edge_palm_on_the_touch_that_has_it() {
    let geom = geometry(1200, 12.0, 6000, 60.0, true);
    let mut device = build_device(2, HoverResolver::pressure_quirk(25, 30), geom);

    let frame_a = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2000),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50),
            syn(),
        ],
        0,
    );
    assert!(frame_a.is_empty());
    assert_eq!(device.touches()[0].palm.state, PalmState::Edge);

    // Slot 0 is re-asserted (a harmless pressure resend) in the same frame a
    // second slot lands away from any exclusion band, so both are dirty and
    // slot 0 sees the now-active, non-palm second touch this same frame.
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_SLOT, 0)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_SLOT, 1)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 7)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 600)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 2000)], 10_000);
    feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50)], 10_000);
    feed(&mut device, &[syn()], 10_000);

    assert_eq!(device.touches()[0].palm.state, PalmState::None);
    assert!(device.touches()[1].is_active());
}

#[test]
fn hover_triggered_begin_resets_history_so_the_first_real_delta_stays_small() {
    let geom = geometry(1000, 100.0, 400, 40.0, false);
    let mut device = build_device(3, HoverResolver::pressure_quirk(25, 30), geom);

    // Lands hovering below the high threshold: no processing happens at all
    // while the touch is still just hovering.
    let frame_a = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 500),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 200),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 20),
            syn(),
        ],
        0,
    );
    assert!(frame_a.is_empty());
    assert_eq!(device.touches()[0].state, TouchState::Hovering);

    // Pressure crosses the high threshold with no position change: hover
    // promotes the touch and resets its motion history in the same frame.
    let frame_b = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 31), syn()], 10_000);
    assert!(frame_b.is_empty(), "a begin frame never contributes motion: {frame_b:?}");
    assert_eq!(device.touches()[0].state, TouchState::Update);
    assert!(device.touches()[0].history.offset(0).is_some());

    // The next real delta is small and ordinary, not an artifact of the
    // earlier hover-to-touch jump in absolute position.
    let frame_c = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 510), syn()], 20_000);
    assert_eq!(frame_c, vec![OutputEvent::Motion { dx_mm: 1.0, dy_mm: 0.0 }]);
}

#[derive(Clone, Default)]
struct RecordingAccel {
    restarts: Rc<Cell<u32>>,
}

impl AccelFilter for RecordingAccel {
    fn dispatch(&mut self, dx_mm: f64, dy_mm: f64, _ctx: FilterContext) -> (f64, f64) {
        (dx_mm, dy_mm)
    }
    fn dispatch_constant(&mut self, dx_mm: f64, dy_mm: f64, _ctx: FilterContext) -> (f64, f64) {
        (dx_mm, dy_mm)
    }
    fn restart(&mut self, _at_time_us: u64) {
        self.restarts.set(self.restarts.get() + 1);
    }
}

#[test]
fn msc_timestamp_gap_restarts_the_accel_filter_exactly_once() {
    let geom = geometry(1000, 100.0, 400, 40.0, false);
    let accel = RecordingAccel::default();
    let restarts = accel.restarts.clone();

    let mut device: Device<RecordingAccel, NoopTap, NoopButton, NoopEdgeScroll, NoopGesture> = Device::new(
        axes_with_slot(3),
        3,
        HoverResolver::pressure_quirk(25, 30),
        geom,
        runtime_config(),
        Margin { mx: 0, my: 0 },
        accel,
        NoopTap,
        NoopButton,
        NoopEdgeScroll,
        NoopGesture,
    );

    device.handle_event(abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5), 0);
    device.handle_event(abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 500), 0);
    device.handle_event(abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 200), 0);
    device.handle_event(abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50), 0);
    device.handle_event(syn(), 0);
    // The touch's own BEGIN restarts the filter once, independent of the MSC
    // corrector; account for it so the MSC-specific restart below is clear.
    assert_eq!(restarts.get(), 1);

    device.handle_event(msc_timestamp(0), 0);
    device.handle_event(syn(), 0);
    assert_eq!(restarts.get(), 1);

    device.handle_event(msc_timestamp(7_300), 7_300);
    device.handle_event(syn(), 7_300);
    assert_eq!(restarts.get(), 1);

    device.handle_event(msc_timestamp(123_456), 130_756);
    device.handle_event(syn(), 130_756);
    assert_eq!(restarts.get(), 2, "the sleep gap must restart the accel filter exactly once");
    assert_eq!(device.touches()[0].history.offset(0).unwrap().1, 14_600);

    // Once in IGNORE, a further large gap is inert.
    device.handle_event(msc_timestamp(900_000), 900_000);
    device.handle_event(syn(), 900_000);
    assert_eq!(restarts.get(), 2);

    // The motion that actually arrived during the gap reads as one ordinary
    // delta, not a jump: the jump detector simply skips an interval this
    // long (> 24ms) rather than flagging it.
    let out = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 510), syn()], 140_756);
    assert_eq!(out, vec![OutputEvent::Motion { dx_mm: 1.0, dy_mm: 0.0 }]);
}

#[test]
fn modifier_then_plain_key_never_triggers_dwt_and_the_pointer_stays_live() {
    let geom = geometry(1000, 100.0, 400, 40.0, false);
    let mut device = build_device(3, HoverResolver::pressure_quirk(25, 30), geom);

    assert_eq!(device.on_key(KeyCode::KEY_LEFTCTRL, true, 0), Some(Action::None));
    assert_eq!(device.on_key(KeyCode::KEY_A, true, 10_000), Some(Action::None));

    let frame_a = feed(
        &mut device,
        &[
            abs(AbsoluteAxisCode::ABS_MT_TRACKING_ID, 5),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 500),
            abs(AbsoluteAxisCode::ABS_MT_POSITION_Y, 200),
            abs(AbsoluteAxisCode::ABS_MT_PRESSURE, 50),
            syn(),
        ],
        0,
    );
    assert!(frame_a.is_empty());

    let frame_b = feed(&mut device, &[abs(AbsoluteAxisCode::ABS_MT_POSITION_X, 510), syn()], 10_000);
    assert_eq!(
        frame_b,
        vec![OutputEvent::Motion { dx_mm: 1.0, dy_mm: 0.0 }],
        "DWT must not have engaged, so pointer motion should pass through: {frame_b:?}"
    );
}

//! Demo binary: drives the touchpad dispatcher against one real evdev node
//! and logs the high-level event stream it produces.
//!
//! `env_logger` initialized from `LOG_LEVEL`, clap-parsed args, a
//! signal-aware tokio main, trimmed to the touchpad-only surface described
//! in `DESIGN.md` — no D-Bus object server, no composite-device `Manager`,
//! no udev hotplug watching. Device enumeration, the quirks database and
//! the outgoing event bus are all external collaborators; this binary
//! stands in for all three with a single CLI-supplied device path, an empty
//! quirks table and stdout.

use std::collections::HashMap;
use std::env;
use std::process;

use clap::Parser;
use evdev::{AbsoluteAxisCode, Device as EvdevDevice};

use touchpadd::collaborators::noop::{NoopAccelFilter, NoopButton, NoopEdgeScroll, NoopGesture, NoopTap};
use touchpadd::config::DeviceConfig;
use touchpadd::device::{Device, DeviceGeometry};
use touchpadd::hover::HoverResolver;
use touchpadd::palm::EdgeGeometry;
use touchpadd::quirks::StaticQuirks;
use touchpadd::thumb::ThumbGeometry;

#[derive(Parser)]
#[command(author, version, about = "Touchpad dispatcher demo", long_about = None)]
struct Args {
    /// Path to the touchpad's evdev node, e.g. /dev/input/event7
    device: String,

    /// Optional YAML device config (see DeviceConfig); built-in defaults are
    /// used for anything it doesn't set.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    env::set_var("RUST_LOG", log_level);
    env_logger::init();

    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => DeviceConfig::from_yaml_file(path)?,
        None => DeviceConfig::from_yaml("version: 1\nname: unnamed\n")?,
    };

    let mut evdev_device = EvdevDevice::open(&args.device)?;
    log::info!("Opened {:?} ({})", evdev_device.name().unwrap_or("unnamed device"), args.device);

    let axes_info: HashMap<AbsoluteAxisCode, evdev::AbsInfo> = evdev_device.get_absinfo()?.collect();

    let real_slot_count = axes_info
        .get(&AbsoluteAxisCode::ABS_MT_SLOT)
        .map(|info| (info.maximum() - info.minimum() + 1) as usize)
        .unwrap_or(1);
    // ntouches = max(num_slots, btn_tool_max): semi-mt and single-slot
    // devices can still assert BTN_TOOL_* up to quinttap, so the logical
    // touch capacity can exceed the real per-slot axis count.
    let num_slots = real_slot_count.max(touchpadd::fake_finger::OVERFLOW as usize);

    let x_info = axes_info
        .get(&AbsoluteAxisCode::ABS_MT_POSITION_X)
        .or_else(|| axes_info.get(&AbsoluteAxisCode::ABS_X))
        .ok_or(touchpadd::DeviceSetupError::MissingAxis(AbsoluteAxisCode::ABS_MT_POSITION_X))?;
    let y_info = axes_info
        .get(&AbsoluteAxisCode::ABS_MT_POSITION_Y)
        .or_else(|| axes_info.get(&AbsoluteAxisCode::ABS_Y))
        .ok_or(touchpadd::DeviceSetupError::MissingAxis(AbsoluteAxisCode::ABS_MT_POSITION_Y))?;

    let resolution_x = x_info.resolution().max(1) as f64;
    let resolution_y = y_info.resolution().max(1) as f64;
    let width_units = x_info.maximum() - x_info.minimum();
    let height_units = y_info.maximum() - y_info.minimum();
    let width_mm = width_units as f64 / resolution_x;
    let height_mm = height_units as f64 / resolution_y;
    if width_mm <= 0.0 || height_mm <= 0.0 {
        return Err(touchpadd::DeviceSetupError::DegenerateGeometry.into());
    }

    config.validate(num_slots)?;

    let quirks = StaticQuirks::new();
    let runtime_config = config.to_runtime_config(&quirks);

    let hover = match axes_info
        .get(&AbsoluteAxisCode::ABS_MT_PRESSURE)
        .or_else(|| axes_info.get(&AbsoluteAxisCode::ABS_PRESSURE))
    {
        Some(info) => HoverResolver::pressure_default(info.minimum(), info.maximum()),
        None => HoverResolver::FakeFinger,
    };

    let supported_keys = evdev_device.supported_keys();
    let is_clickpad = supported_keys.map(|keys| keys.contains(evdev::KeyCode::BTN_LEFT)).unwrap_or(false)
        && !supported_keys.map(|keys| keys.contains(evdev::KeyCode::BTN_RIGHT)).unwrap_or(false);

    let geometry = DeviceGeometry {
        units_per_mm_x: resolution_x,
        units_per_mm_y: resolution_y,
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
    };

    let margin = touchpadd::history::Margin::from_axis(x_info.fuzz(), x_info.resolution(), y_info.fuzz(), y_info.resolution());

    let mut device = Device::new(
        axes_info,
        num_slots,
        hover,
        geometry,
        runtime_config,
        margin,
        NoopAccelFilter,
        NoopTap,
        NoopButton,
        NoopEdgeScroll,
        NoopGesture,
    );
    device.set_left_handed_rotate(config.left_handed.enabled && config.left_handed.rotate);

    // `send-events: disabled` is just the SENDEVENTS suspend bit asserted
    // from the start; `disabled-on-external-mouse` needs a live mouse
    // hotplug signal this standalone binary has no source for, so it is
    // accepted in config but has no effect here.
    if config.send_events == touchpadd::config::SendEventsMode::Disabled {
        device.suspend(touchpadd::arbitration::SuspendReason::SENDEVENTS);
    }

    let mut stream = evdev_device.into_event_stream()?;

    log::info!("Dispatching events from {}", args.device);
    let mut exit_code = 0;
    tokio::select! {
        result = run(&mut stream, &mut device) => {
            if let Err(err) = result {
                log::error!("Error reading from device: {err}");
                exit_code = -1;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received CTRL+C. Shutting down.");
        }
    }

    process::exit(exit_code);
}

async fn run<A, T, B, E, G>(stream: &mut evdev::EventStream, device: &mut Device<A, T, B, E, G>) -> std::io::Result<()>
where
    A: touchpadd::collaborators::AccelFilter,
    T: touchpadd::collaborators::TapHandler,
    B: touchpadd::collaborators::ButtonHandler,
    E: touchpadd::collaborators::EdgeScroll,
    G: touchpadd::collaborators::Gesture,
{
    loop {
        let event = stream.next_event().await?;
        let time_us = event_time_us(&event);
        for out_event in device.handle_event(event, time_us) {
            log::info!("{out_event:?}");
        }
    }
}

/// Converts the kernel-supplied wall-clock timestamp on an event into a
/// monotonically-comparable microsecond value. Real deployments see
/// monotonically non-decreasing timestamps per device; a demo binary
/// reading one device's stream in order gets that for free from the kernel.
fn event_time_us(event: &evdev::InputEvent) -> u64 {
    match event.timestamp().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_micros() as u64,
        Err(_) => 0,
    }
}

//! Deterministic touchpad input dispatcher: ingests raw per-frame kernel
//! evdev events from a multi-touch trackpad and produces a high-level
//! pointer/scroll/gesture/tap/button event stream.
//!
//! The crate root is a flat `pub mod` layout (`src/main.rs` listing one
//! line per subsystem); each module below corresponds to one component from
//! the dispatcher's component table.

pub mod arbitration;
pub mod collaborators;
pub mod config;
pub mod device;
pub mod dwt;
pub mod error;
pub mod fake_finger;
pub mod frame;
pub mod history;
pub mod hover;
pub mod jump;
pub mod palm;
pub mod quirks;
pub mod thumb;
pub mod timestamp;
pub mod touch;

pub use device::{Device, DeviceGeometry, RuntimeConfig};
pub use error::DeviceSetupError;

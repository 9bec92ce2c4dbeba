//! Crate-wide error re-exports.
//!
//! Per-module `thiserror` enums, not a single catch-all error type: this
//! module is just a place callers outside a given module can find the error
//! enum that module actually returns.

pub use crate::collaborators::CollaboratorError;
pub use crate::config::LoadError;

use thiserror::Error;

/// Failures that can occur while bringing up a physical device: opening the
/// evdev node, reading its axis metadata, or resolving the axes this crate
/// requires into a [`crate::device::DeviceGeometry`]. Distinct from
/// [`CollaboratorError`] and [`LoadError`], which belong to narrower
/// sub-modules and keep their own error enums.
#[derive(Error, Debug)]
pub enum DeviceSetupError {
    #[error("failed to open evdev device: {0}")]
    Open(#[source] std::io::Error),
    #[error("device is missing required axis {0:?}")]
    MissingAxis(evdev::AbsoluteAxisCode),
    #[error("device reports zero-width or zero-height surface")]
    DegenerateGeometry,
}

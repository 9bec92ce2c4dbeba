//! Runtime configuration surface.
//!
//! `serde_yaml` deserialization with a `LoadError` enum and a defensive
//! maximum-read-size guard against a config file denial-of-service. Unlike
//! a composite gamepad's capability-mapping pipeline, this `DeviceConfig`
//! describes only the touchpad's own options.

use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::RuntimeConfig;
use crate::quirks::Quirks;

/// Maximum size accepted for a device config file.
const MAX_CONFIG_SIZE: usize = 512 * 1024;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not deserialize config: {0}")]
    Deserialize(#[from] serde_yaml::Error),
    #[error("config too large, reached maximum size of {0} bytes")]
    MaximumSizeReached(usize),
    #[error("two-finger scroll requires a device with at least 2 touches, this device has {0}")]
    TwoFingerScrollUnsupported(usize),
}

/// Overall enable gating. `Disabled` overrides `DisabledOnExternalMouse`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SendEventsMode {
    #[default]
    Enabled,
    Disabled,
    DisabledOnExternalMouse,
}

/// Selects the scroll recognizer. `TwoFinger` requires `ntouches >= 2`,
/// checked by [`DeviceConfig::validate`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollMethod {
    #[default]
    Edge,
    TwoFinger,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DwtMode {
    #[default]
    Enabled,
    Disabled,
}

/// Fixed-profile acceleration is the only supported profile ("none"/fixed);
/// kept as an enum rather than a bare unit so a future profile can be added
/// without breaking the YAML schema.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AccelProfile {
    #[default]
    None,
}

/// Left-handed operation: swaps physical left/right and, for devices whose
/// axes are reversible (Wacom-style), optionally rotates the axes
/// themselves instead of remapping buttons downstream.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct LeftHanded {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rotate: bool,
}

/// Tap-to-click and its variants are delegated wholesale to the tap
/// collaborator; the dispatcher core only carries the config through to
/// whatever implements [`crate::collaborators::TapHandler`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TapConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tap_drag: bool,
    #[serde(default)]
    pub tap_drag_lock: bool,
    #[serde(default)]
    pub button_map: Option<String>,
}

/// Thresholds this crate's own classifiers need (palm pressure/size, thumb
/// promotion, speed-thumb) that aren't named as a user-facing option but
/// that a device profile may still want to override from what the quirks
/// database supplies. `None` means "use the quirks value".
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ThresholdOverrides {
    #[serde(default)]
    pub pressure_threshold: Option<i32>,
    #[serde(default)]
    pub size_threshold: Option<i32>,
    #[serde(default)]
    pub speed_threshold_mm_s: Option<f64>,
}

/// Fallback thresholds when neither the config nor the quirks database
/// supplies one. These mirror values found in the wild for Synaptics/Clickpad
/// touchpads' default quirk files.
const DEFAULT_PRESSURE_THRESHOLD: i32 = 190;
const DEFAULT_SIZE_THRESHOLD: i32 = 10;
const DEFAULT_SPEED_THRESHOLD_MM_S: f64 = 150.0;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub send_events: SendEventsMode,
    #[serde(default)]
    pub scroll_method: ScrollMethod,
    #[serde(default)]
    pub dwt: DwtMode,
    #[serde(default)]
    pub tap: TapConfig,
    #[serde(default)]
    pub left_handed: LeftHanded,
    #[serde(default)]
    pub accel_profile: AccelProfile,
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
}

impl DeviceConfig {
    /// Load a [`DeviceConfig`] from a YAML string.
    pub fn from_yaml(content: &str) -> Result<DeviceConfig, LoadError> {
        let device: DeviceConfig = serde_yaml::from_str(content)?;
        Ok(device)
    }

    /// Load a [`DeviceConfig`] from a YAML file, refusing to read past
    /// [`MAX_CONFIG_SIZE`] bytes: a defensive bound against resource
    /// exhaustion from a malformed or hostile config file.
    pub fn from_yaml_file(path: &str) -> Result<DeviceConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let mut reader = file.take(MAX_CONFIG_SIZE as u64);
        let mut content = String::new();
        let bytes_read = reader.read_to_string(&mut content)?;
        if bytes_read == MAX_CONFIG_SIZE {
            return Err(LoadError::MaximumSizeReached(MAX_CONFIG_SIZE));
        }
        Self::from_yaml(&content)
    }

    /// Rejects configs that request a scroll method the device physically
    /// cannot support (two-finger scroll needs `ntouches >= 2`).
    pub fn validate(&self, ntouches: usize) -> Result<(), LoadError> {
        if self.scroll_method == ScrollMethod::TwoFinger && ntouches < 2 {
            return Err(LoadError::TwoFingerScrollUnsupported(ntouches));
        }
        Ok(())
    }

    /// Resolves this config, plus whatever the quirks database supplies,
    /// into the [`RuntimeConfig`] the pipeline orchestrator reads every
    /// frame. Thresholds follow config override -> quirk value -> built-in
    /// default, in that order.
    pub fn to_runtime_config(&self, quirks: &dyn Quirks) -> RuntimeConfig {
        let pressure_threshold = self
            .thresholds
            .pressure_threshold
            .or_else(|| quirks.get_u32("PalmPressureThreshold").map(|v| v as i32))
            .unwrap_or(DEFAULT_PRESSURE_THRESHOLD);
        let size_threshold = self
            .thresholds
            .size_threshold
            .or_else(|| quirks.get_u32("PalmSizeThreshold").map(|v| v as i32))
            .unwrap_or(DEFAULT_SIZE_THRESHOLD);
        let speed_threshold_mm_s = self.thresholds.speed_threshold_mm_s.unwrap_or(DEFAULT_SPEED_THRESHOLD_MM_S);

        RuntimeConfig {
            dwt_enabled: self.dwt == DwtMode::Enabled,
            scroll_method_is_edge: self.scroll_method == ScrollMethod::Edge,
            two_finger_scroll_enabled: self.scroll_method == ScrollMethod::TwoFinger,
            detect_thumbs: true,
            pressure_threshold,
            size_threshold,
            speed_threshold_mm_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quirks::StaticQuirks;

    #[test]
    fn minimal_yaml_fills_in_defaults() {
        let yaml = "version: 1\nname: Synaptics TM3289-002\n";
        let config = DeviceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.send_events, SendEventsMode::Enabled);
        assert_eq!(config.scroll_method, ScrollMethod::Edge);
        assert_eq!(config.dwt, DwtMode::Enabled);
    }

    #[test]
    fn full_yaml_round_trips_every_field() {
        let yaml = r#"
version: 1
name: Synaptics TM3289-002
send-events: disabled-on-external-mouse
scroll-method: two-finger
dwt: disabled
tap:
  enabled: true
  tap-drag: true
left-handed:
  enabled: true
  rotate: false
"#;
        let config = DeviceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.send_events, SendEventsMode::DisabledOnExternalMouse);
        assert_eq!(config.scroll_method, ScrollMethod::TwoFinger);
        assert_eq!(config.dwt, DwtMode::Disabled);
        assert!(config.tap.enabled);
        assert!(config.tap.tap_drag);
        assert!(config.left_handed.enabled);
    }

    #[test]
    fn two_finger_scroll_rejected_on_a_single_touch_device() {
        let yaml = "version: 1\nname: Test\nscroll-method: two-finger\n";
        let config = DeviceConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(1), Err(LoadError::TwoFingerScrollUnsupported(1))));
        assert!(config.validate(2).is_ok());
    }

    #[test]
    fn threshold_override_beats_quirk_and_default() {
        let mut yaml = DeviceConfig::from_yaml("version: 1\nname: Test\n").unwrap();
        let quirks = StaticQuirks::new().with("PalmPressureThreshold", crate::quirks::QuirkValue::U32(220));
        let runtime = yaml.to_runtime_config(&quirks);
        assert_eq!(runtime.pressure_threshold, 220);

        yaml.thresholds.pressure_threshold = Some(300);
        let runtime = yaml.to_runtime_config(&quirks);
        assert_eq!(runtime.pressure_threshold, 300);
    }

    #[test]
    fn missing_quirk_falls_back_to_builtin_default() {
        let config = DeviceConfig::from_yaml("version: 1\nname: Test\n").unwrap();
        let quirks = StaticQuirks::new();
        let runtime = config.to_runtime_config(&quirks);
        assert_eq!(runtime.pressure_threshold, DEFAULT_PRESSURE_THRESHOLD);
        assert_eq!(runtime.size_threshold, DEFAULT_SIZE_THRESHOLD);
    }
}

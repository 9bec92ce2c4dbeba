//! Hover resolver (C3): decides which slots are actually touching.

use crate::touch::{Touch, TouchState};

/// An inclusive `[low, high]` threshold pair, expressed in raw device axis
/// units (pressure or size, depending on the variant).
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub low: i32,
    pub high: i32,
}

/// Which hover-detection strategy a device uses, selected once at device
/// init.
#[derive(Debug, Clone)]
pub enum HoverResolver {
    Pressure(Thresholds),
    Size(Thresholds),
    FakeFinger,
}

impl HoverResolver {
    /// Builds the pressure-based variant from an axis range, using the
    /// default 12%/10% split unless a quirk supplies explicit thresholds.
    pub fn pressure_default(min: i32, max: i32) -> Self {
        let range = max - min;
        HoverResolver::Pressure(Thresholds {
            low: min + range / 10,
            high: min + (range * 12) / 100,
        })
    }

    pub fn pressure_quirk(low: i32, high: i32) -> Self {
        HoverResolver::Pressure(Thresholds { low, high })
    }

    pub fn size_quirk(low: i32, high: i32) -> Self {
        HoverResolver::Size(Thresholds { low, high })
    }

    /// Evaluate one dirty touch's hover transition. Returns `true` if the
    /// touch's motion history should be reset (on any begin).
    ///
    /// The `FakeFinger` variant is a no-op here: its reconciliation depends
    /// on the aggregate finger count across all slots, not a single touch,
    /// and is handled separately by [`reconcile_fake_fingers`].
    pub fn resolve(&self, touch: &mut Touch) -> bool {
        match self {
            HoverResolver::Pressure(t) => self.resolve_pressure(touch, *t),
            HoverResolver::Size(t) => self.resolve_size(touch, *t),
            HoverResolver::FakeFinger => false,
        }
    }

    fn resolve_pressure(&self, touch: &mut Touch, t: Thresholds) -> bool {
        match touch.state {
            TouchState::Hovering => {
                if touch.pressure.unwrap_or(0) >= t.high {
                    touch.state = TouchState::Begin;
                    touch.was_down = true;
                    return true;
                }
                false
            }
            TouchState::Begin | TouchState::Update => {
                if touch.pressure.unwrap_or(i32::MAX) < t.low {
                    touch.state = TouchState::MaybeEnd;
                }
                false
            }
            _ => false,
        }
    }

    fn resolve_size(&self, touch: &mut Touch, t: Thresholds) -> bool {
        let major = touch.major.unwrap_or(0);
        let minor = touch.minor.unwrap_or(0);
        match touch.state {
            TouchState::Hovering => {
                let begins = (major > t.high && minor > t.low) || (major > t.low && minor > t.high);
                if begins {
                    touch.state = TouchState::Begin;
                    touch.was_down = true;
                    return true;
                }
                false
            }
            TouchState::Begin | TouchState::Update => {
                if major < t.low || minor < t.low {
                    touch.state = TouchState::MaybeEnd;
                }
                false
            }
            _ => false,
        }
    }
}

/// Fake-finger-based hover resolution (fallback strategy): begins hovering slots
/// in slot order until the active count matches `fake_count`; ends touches
/// in reverse slot order to bring the count back down when the kernel
/// reports fewer fingers than are currently active.
pub fn reconcile_fake_fingers(touches: &mut [Touch], fake_count: usize) {
    let mut active = touches.iter().filter(|t| t.is_active()).count();

    if active < fake_count {
        for touch in touches.iter_mut() {
            if active >= fake_count {
                break;
            }
            if touch.state == TouchState::Hovering {
                touch.state = TouchState::Begin;
                touch.was_down = true;
                touch.dirty = true;
                touch.history.reset();
                active += 1;
            }
        }
    } else if active > fake_count {
        for touch in touches.iter_mut().rev() {
            if active <= fake_count {
                break;
            }
            if touch.is_active() {
                touch.state = TouchState::MaybeEnd;
                touch.dirty = true;
                active -= 1;
            }
        }
    }
}

/// Semi-mt / limited-slot devices report more fingers via `BTN_TOOL_*` than
/// they have real per-slot axis data for; [`reconcile_fake_fingers`] already
/// promotes slots beyond `real_slot_count` to `Begin` to match the count,
/// but never reports a coordinate for them. Copies the highest-indexed
/// active real slot's point into every active slot at or beyond
/// `real_slot_count` so those touches still carry a usable position.
pub fn synthesize_fake_slot_coordinates(touches: &mut [Touch], real_slot_count: usize) {
    if real_slot_count == 0 || real_slot_count >= touches.len() {
        return;
    }
    let Some(source) = touches[..real_slot_count].iter().rev().find(|t| t.is_active()).map(|t| t.point) else {
        return;
    };

    for touch in touches[real_slot_count..].iter_mut() {
        if touch.is_active() {
            touch.point = source;
            touch.dirty = true;
        }
    }
}

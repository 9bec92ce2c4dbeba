//! Disable-while-typing (C10).
//!
//! Driven entirely by paired-keyboard key events reaching the dispatcher
//! through a listener callback — this module has no opinion on how the
//! keyboard device itself is discovered.

use bitflags::bitflags;
use evdev::KeyCode;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModMask: u16 {
        const LCTRL = 1 << 0;
        const RCTRL = 1 << 1;
        const LALT = 1 << 2;
        const RALT = 1 << 3;
        const LSHIFT = 1 << 4;
        const RSHIFT = 1 << 5;
        const LMETA = 1 << 6;
        const RMETA = 1 << 7;
        const FN = 1 << 8;
        const CAPSLOCK = 1 << 9;
        const TAB = 1 << 10;
        const COMPOSE = 1 << 11;
    }
}

const FIRST_IGNORED_RAW_CODE: u16 = KeyCode::KEY_F1.0;

/// What a key event means to the DWT state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyClass {
    Modifier(ModMask),
    /// `F1` and above: never relevant to typing detection.
    Ignored,
    Other,
}

fn classify(code: KeyCode) -> KeyClass {
    let bit = match code {
        KeyCode::KEY_LEFTCTRL => ModMask::LCTRL,
        KeyCode::KEY_RIGHTCTRL => ModMask::RCTRL,
        KeyCode::KEY_LEFTALT => ModMask::LALT,
        KeyCode::KEY_RIGHTALT => ModMask::RALT,
        KeyCode::KEY_LEFTSHIFT => ModMask::LSHIFT,
        KeyCode::KEY_RIGHTSHIFT => ModMask::RSHIFT,
        KeyCode::KEY_LEFTMETA => ModMask::LMETA,
        KeyCode::KEY_RIGHTMETA => ModMask::RMETA,
        KeyCode::KEY_FN => ModMask::FN,
        KeyCode::KEY_CAPSLOCK => ModMask::CAPSLOCK,
        KeyCode::KEY_TAB => ModMask::TAB,
        KeyCode::KEY_COMPOSE => ModMask::COMPOSE,
        other if other.0 >= FIRST_IGNORED_RAW_CODE => return KeyClass::Ignored,
        _ => return KeyClass::Other,
    };
    KeyClass::Modifier(bit)
}

const BEGIN_TIMEOUT_US: u64 = 200_000;
const REFRESH_TIMEOUT_US: u64 = 500_000;

/// What the pipeline orchestrator must do in response to a key event or an
/// expired DWT timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing changes (modifier key, ignored key, or a down/up that doesn't
    /// cross a DWT edge).
    None,
    /// DWT just activated: stop tap, stop gestures, stop scroll, arm a timer
    /// for `deadline_us` from now.
    Begin { deadline_us: u64 },
    /// DWT already active; push its timer out to `deadline_us` from now.
    Refresh { deadline_us: u64 },
    /// DWT just deactivated: tap may resume.
    End,
}

/// Up to three paired keyboards share one instance; callers route every
/// paired keyboard's events through the same `Dwt`, since the policy only
/// cares about the union of keys held down, not which keyboard holds which.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dwt {
    mod_mask: ModMask,
    keys_down: u8,
    active: bool,
}

impl Dwt {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_key(&mut self, code: KeyCode, down: bool) -> Action {
        match classify(code) {
            KeyClass::Ignored => Action::None,
            KeyClass::Modifier(bit) => {
                self.mod_mask.set(bit, down);
                Action::None
            }
            KeyClass::Other => {
                if down {
                    self.keys_down = self.keys_down.saturating_add(1);
                    if !self.active && self.mod_mask.is_empty() {
                        self.active = true;
                        Action::Begin { deadline_us: BEGIN_TIMEOUT_US }
                    } else if self.active {
                        Action::Refresh { deadline_us: REFRESH_TIMEOUT_US }
                    } else {
                        Action::None
                    }
                } else {
                    self.keys_down = self.keys_down.saturating_sub(1);
                    Action::None
                }
            }
        }
    }

    /// Called when the DWT timer fires.
    pub fn on_timeout(&mut self) -> Action {
        if !self.active {
            return Action::None;
        }
        if self.keys_down > 0 {
            Action::Refresh { deadline_us: REFRESH_TIMEOUT_US }
        } else {
            self.active = false;
            Action::End
        }
    }
}

/// Pairing policy: a keyboard pairs with this touchpad iff the touchpad is
/// internal, or the touchpad is external and the keyboard's vendor/product
/// match it.
pub fn should_pair(
    touchpad_is_internal: bool,
    touchpad_vendor: u16,
    touchpad_product: u16,
    keyboard_vendor: u16,
    keyboard_product: u16,
) -> bool {
    touchpad_is_internal || (touchpad_vendor == keyboard_vendor && touchpad_product == keyboard_product)
}

//! Jump detector (C5).
//!
//! Runs once per dirty, active touch before `history.push`, comparing the
//! reported delta against a speed-normalized threshold so that a slow, wide
//! swipe is not mistaken for the kind of teleport a bad sensor frame produces.

const REFERENCE_INTERVAL_MS: f64 = 12.0;
const JUMP_THRESHOLD_MM: f64 = 20.0;
const JUMP_DELTA_THRESHOLD_MM: f64 = 7.0;
const MAX_DT_MS: f64 = 24.0;

/// Outcome of one jump-detector evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpOutcome {
    /// No jump; `delta_mm` should be remembered as `last_delta_mm`.
    Normal { delta_mm: f64 },
    /// A jump was declared; caller must reset the touch's motion history.
    Jump { delta_mm: f64 },
    /// Frame was too irregular to evaluate (`Δt == 0` or `Δt > 2 * reference`).
    Skipped,
}

/// Disabled entirely on Wacom-tagged devices; callers check that before
/// calling this function.
pub fn detect(dx_mm: f64, dy_mm: f64, dt_ms: f64, last_delta_mm: f64) -> JumpOutcome {
    if dt_ms <= 0.0 || dt_ms > MAX_DT_MS {
        return JumpOutcome::Skipped;
    }

    let raw_mm = dx_mm.hypot(dy_mm);
    let delta_mm = raw_mm * (REFERENCE_INTERVAL_MS / dt_ms);

    if delta_mm > JUMP_THRESHOLD_MM || (delta_mm - last_delta_mm) > JUMP_DELTA_THRESHOLD_MM {
        JumpOutcome::Jump { delta_mm }
    } else {
        JumpOutcome::Normal { delta_mm }
    }
}

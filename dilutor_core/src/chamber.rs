//! Per-chamber hysteresis phase machine (chamber mode).
//!
//! A relay with a ±5% band around the running setpoint: a growing
//! culture must climb to the band's lower edge before its chamber
//! flips to the dilution target, and a diluting culture must fall back
//! to the band's upper edge before it flips back. Anything strictly
//! inside the band holds the current phase, which is what keeps the
//! relay from chattering.

use crate::state::{HYSTERESIS_BAND, Phase};

/// Evaluate one tick for every chamber.
///
/// `ods[i]` belongs to chamber `i`; a `0.0` entry means the measurement
/// is unavailable and the chamber holds its phase. Returns true if any
/// chamber changed phase (the caller folds the per-chamber decisions
/// into one log/persist decision).
pub fn step(
    phases: &mut [Phase],
    setpoint: &mut [f64],
    save_setpoint: &[f64],
    block_start: &[f64],
    ods: &[f64],
) -> bool {
    let mut changed = false;
    for i in 0..phases.len() {
        let od = ods[i];
        if od == 0.0 {
            continue;
        }
        match phases[i] {
            Phase::Growing => {
                // Culture has grown up to the target band: start diluting.
                if od >= setpoint[i] * (1.0 - HYSTERESIS_BAND) {
                    phases[i] = Phase::Diluting;
                    setpoint[i] = block_start[i];
                    changed = true;
                }
            }
            Phase::Diluting => {
                // Dilution brought the culture back down: grow again.
                if od <= setpoint[i] * (1.0 + HYSTERESIS_BAND) {
                    phases[i] = Phase::Growing;
                    setpoint[i] = save_setpoint[i];
                    changed = true;
                }
            }
        }
    }
    changed
}

//! The persistent controller state record and the block log row shape.
//!
//! One TOML document holds everything a tick needs to resume: setpoint
//! vectors, explicit phase tags, gains, limits, interval lengths, the
//! PI integral terms, and the most recent block-log row. The record is
//! the single source of truth; the CSV block log is an append-only
//! audit materialization of its `last_entry` history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TickError;

pub use dilutor_config::Mode;

/// Hysteresis tolerance around the running setpoint, as a fraction.
pub const HYSTERESIS_BAND: f64 = 0.05;

/// Interval length used when the config leaves a block interval unset.
pub const DEFAULT_INTERVAL_HOURS: f64 = 1.0;

/// Per-chamber phase in chamber (hysteresis) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Driving toward the growth target (`save_setpoint`).
    Growing,
    /// Driving toward the dilution target (`block_start`).
    Diluting,
}

/// Global block in schedule (interval) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Growth,
    Dilution,
}

/// Explicit phase tag, persisted alongside the setpoints.
///
/// State-machine decisions branch on this tag, never on floating-point
/// equality between setpoint vectors. The tag also pins the mode the
/// experiment was initialized in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PhaseTag {
    Chamber { phases: Vec<Phase> },
    Schedule { block: Block },
}

impl PhaseTag {
    pub fn mode(&self) -> Mode {
        match self {
            PhaseTag::Chamber { .. } => Mode::Chamber,
            PhaseTag::Schedule { .. } => Mode::Schedule,
        }
    }

    /// Initial tag for a fresh experiment: everything grows first.
    pub fn initial(mode: Mode, chambers: usize) -> Self {
        match mode {
            Mode::Chamber => PhaseTag::Chamber {
                phases: vec![Phase::Growing; chambers],
            },
            Mode::Schedule => PhaseTag::Schedule {
                block: Block::Growth,
            },
        }
    }
}

/// One row of the block transition audit trail.
///
/// The last row written is also embedded in [`ControllerState`] so the
/// "previous state" lookup never scans the CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLogEntry {
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    /// Setpoint vector after this tick's decision.
    pub setpoint: Vec<f64>,
    /// Hours since the experiment started.
    pub elapsed_hours: f64,
    /// Raw machine clock of the OD reading snapshotted here.
    pub machine_time: i64,
    pub ods: Vec<f64>,
}

impl BlockLogEntry {
    pub const CSV_HEADER: [&'static str; 6] = [
        "timestamp",
        "mode",
        "setpoint",
        "elapsed_hours",
        "machine_time",
        "ods",
    ];

    /// CSV field values; vectors are space-joined inside one field.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.timestamp.to_rfc3339(),
            self.mode.to_string(),
            join_floats(&self.setpoint),
            self.elapsed_hours.to_string(),
            self.machine_time.to_string(),
            join_floats(&self.ods),
        ]
    }
}

fn join_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The controller state record. Owned by the transition driver; every
/// mutation goes through an atomic replace of the backing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Number of chambers; all vectors below have exactly this length.
    pub chambers: usize,
    /// Setpoint currently being driven toward, per chamber. The only
    /// field the actuator side reads.
    pub setpoint: Vec<f64>,
    /// Growth target captured once at first run, never overwritten.
    pub save_setpoint: Vec<f64>,
    /// Dilution target (the lower reference value).
    pub block_start: Vec<f64>,
    /// Guards the one-time `setpoint -> save_setpoint` capture.
    pub baseline_captured: bool,
    pub ki: f64,
    pub kp: f64,
    pub min_dilution: f64,
    pub max_dilution: f64,
    pub growth_interval_hours: f64,
    pub dilution_interval_hours: f64,
    /// Seed for integral terms that have never been persisted.
    pub integral_seed: f64,
    /// Per-chamber PI integral terms; empty until the first dilution
    /// pass runs.
    #[serde(default)]
    pub integral_state: Vec<f64>,
    /// First tick of the experiment; anchors `elapsed_hours`.
    pub started_at: DateTime<Utc>,
    // The two table-valued fields stay last so the record renders as
    // root scalars followed by [phase] and [last_entry] sections.
    pub phase: PhaseTag,
    /// Embedded tail of the block log.
    pub last_entry: BlockLogEntry,
}

impl ControllerState {
    /// Structural and semantic validation, run on every load.
    ///
    /// Shape problems are `ConfigMalformed`; a setpoint that is not one
    /// of its two reference values, or that disagrees with the phase
    /// tag, is `InconsistentState` (the corruption detector).
    pub fn validate(&self) -> Result<(), TickError> {
        if self.chambers == 0 {
            return Err(TickError::ConfigMalformed("chambers must be > 0".into()));
        }
        for (name, len) in [
            ("setpoint", self.setpoint.len()),
            ("save_setpoint", self.save_setpoint.len()),
            ("block_start", self.block_start.len()),
        ] {
            if len != self.chambers {
                return Err(TickError::ConfigMalformed(format!(
                    "{name} has {len} entries, expected {}",
                    self.chambers
                )));
            }
        }
        if !self.integral_state.is_empty() && self.integral_state.len() != self.chambers {
            return Err(TickError::ConfigMalformed(format!(
                "integral_state has {} entries, expected {} or none",
                self.integral_state.len(),
                self.chambers
            )));
        }
        for (name, values) in [
            ("setpoint", &self.setpoint),
            ("save_setpoint", &self.save_setpoint),
            ("block_start", &self.block_start),
            ("integral_state", &self.integral_state),
        ] {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(TickError::ConfigMalformed(format!(
                    "{name} contains a non-finite value"
                )));
            }
        }
        for (name, v) in [
            ("ki", self.ki),
            ("kp", self.kp),
            ("min_dilution", self.min_dilution),
            ("max_dilution", self.max_dilution),
            ("integral_seed", self.integral_seed),
        ] {
            if !v.is_finite() {
                return Err(TickError::ConfigMalformed(format!("{name} is not finite")));
            }
        }
        if self.min_dilution > self.max_dilution {
            return Err(TickError::ConfigMalformed(
                "min_dilution exceeds max_dilution".into(),
            ));
        }
        for (name, h) in [
            ("growth_interval_hours", self.growth_interval_hours),
            ("dilution_interval_hours", self.dilution_interval_hours),
        ] {
            if !(h.is_finite() && h > 0.0) {
                return Err(TickError::ConfigMalformed(format!("{name} must be > 0")));
            }
        }

        if let PhaseTag::Chamber { phases } = &self.phase
            && phases.len() != self.chambers
        {
            return Err(TickError::ConfigMalformed(format!(
                "phase tag has {} chambers, expected {}",
                phases.len(),
                self.chambers
            )));
        }
        if self.last_entry.setpoint.len() != self.chambers
            || self.last_entry.ods.len() != self.chambers
        {
            return Err(TickError::ConfigMalformed(
                "last_entry vectors do not match chamber count".into(),
            ));
        }

        self.check_invariant()
    }

    /// The running setpoint must always be one of exactly two known
    /// reference values, and must agree with the persisted phase tag.
    ///
    /// Exact `f64` comparison is sound here: the record round-trips
    /// through TOML losslessly, so a mismatch means one of the stores
    /// was altered behind the driver's back.
    fn check_invariant(&self) -> Result<(), TickError> {
        for i in 0..self.chambers {
            let expected = match &self.phase {
                PhaseTag::Chamber { phases } => match phases[i] {
                    Phase::Growing => self.save_setpoint[i],
                    Phase::Diluting => self.block_start[i],
                },
                PhaseTag::Schedule { block } => match block {
                    Block::Growth => self.save_setpoint[i],
                    Block::Dilution => self.block_start[i],
                },
            };
            if self.setpoint[i] != expected {
                return Err(TickError::InconsistentState(format!(
                    "chamber {i}: setpoint {} does not match the {} reference {expected}",
                    self.setpoint[i],
                    match &self.phase {
                        PhaseTag::Chamber { .. } => "phase",
                        PhaseTag::Schedule { .. } => "block",
                    },
                )));
            }
        }
        if self.setpoint != self.last_entry.setpoint {
            return Err(TickError::InconsistentState(
                "setpoint disagrees with the committed log tail".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_state() -> ControllerState {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let setpoint = vec![0.6; 4];
        ControllerState {
            chambers: 4,
            setpoint: setpoint.clone(),
            save_setpoint: setpoint.clone(),
            block_start: vec![0.2; 4],
            baseline_captured: true,
            phase: PhaseTag::initial(Mode::Chamber, 4),
            ki: 1.0,
            kp: 5.0,
            min_dilution: 0.0,
            max_dilution: 400.0,
            growth_interval_hours: 5.0,
            dilution_interval_hours: 2.0,
            integral_seed: 90.0,
            integral_state: Vec::new(),
            started_at: t0,
            last_entry: BlockLogEntry {
                timestamp: t0,
                mode: Mode::Chamber,
                setpoint,
                elapsed_hours: 0.0,
                machine_time: 1000,
                ods: vec![0.1; 4],
            },
        }
    }

    #[test]
    fn valid_state_passes() {
        sample_state().validate().expect("valid state");
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut s = sample_state();
        s.block_start.pop();
        assert!(matches!(
            s.validate(),
            Err(TickError::ConfigMalformed(_))
        ));
    }

    #[test]
    fn detects_setpoint_outside_references() {
        let mut s = sample_state();
        s.setpoint[2] = 0.41;
        s.last_entry.setpoint[2] = 0.41;
        assert!(matches!(
            s.validate(),
            Err(TickError::InconsistentState(_))
        ));
    }

    #[test]
    fn detects_tag_disagreement() {
        let mut s = sample_state();
        // Tag says Growing but the setpoint holds the dilution reference.
        s.setpoint[0] = s.block_start[0];
        s.last_entry.setpoint[0] = s.block_start[0];
        assert!(matches!(
            s.validate(),
            Err(TickError::InconsistentState(_))
        ));
    }

    #[test]
    fn detects_stale_log_tail() {
        let mut s = sample_state();
        s.last_entry.setpoint[0] = 0.55;
        assert!(matches!(
            s.validate(),
            Err(TickError::InconsistentState(_))
        ));
    }

    #[test]
    fn state_round_trips_through_toml_exactly() {
        let mut s = sample_state();
        // Values with no short decimal representation must survive.
        s.setpoint[1] = 0.1 + 0.2;
        s.save_setpoint[1] = 0.1 + 0.2;
        s.last_entry.setpoint[1] = 0.1 + 0.2;
        s.integral_state = vec![90.0, 13.37, 0.30000000000000004, 399.99];
        let text = toml::to_string(&s).expect("serialize");
        let back: ControllerState = toml::from_str(&text).expect("parse");
        assert_eq!(back, s);
    }
}

#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the dilution controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Validation rejects malformed input (vector-length mismatches,
//!   non-finite gains, inverted actuator limits) before any control
//!   logic runs.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which phase state machine drives the setpoints.
///
/// Fixed per experiment: `Chamber` reacts to each chamber's OD
/// (hysteresis relay), `Schedule` switches all chambers on a wall-clock
/// interval.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Schedule,
    Chamber,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Schedule => f.write_str("schedule"),
            Mode::Chamber => f.write_str("chamber"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schedule" => Ok(Mode::Schedule),
            "chamber" => Ok(Mode::Chamber),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// `[controller]`: initial setpoints, gains and limits.
///
/// These seed the persistent state record on the first tick; after
/// bootstrap the state file is the authority and this section is only
/// consulted again for a fresh experiment.
#[derive(Debug, Deserialize)]
pub struct ControllerCfg {
    /// Number of culture chambers; all vectors must have this length.
    #[serde(default = "default_chambers")]
    pub chambers: usize,
    /// Growth target OD per chamber.
    pub setpoint: Vec<f64>,
    /// Dilution-block target OD per chamber (the lower reference).
    pub block_start: Vec<f64>,
    /// Integral gain (shared across chambers).
    pub ki: f64,
    /// Proportional gain (shared across chambers).
    pub kp: f64,
    /// Actuator saturation limits in dilution command units.
    pub min_dilution: f64,
    pub max_dilution: f64,
    /// Interval mode block lengths; default 1 hour each when unset.
    pub growth_interval_hours: Option<f64>,
    pub dilution_interval_hours: Option<f64>,
    /// Seed for a chamber's PI integral term before any has been
    /// persisted; reflects the expected steady-state dilution rate.
    #[serde(default = "default_integral_seed")]
    pub integral_seed: f64,
    /// Phase machine selection; may instead be given on the command line.
    pub mode: Option<Mode>,
}

fn default_chambers() -> usize {
    8
}

fn default_integral_seed() -> f64 {
    90.0
}

/// `[log]`: paths to the persistent stores and the OD input log.
#[derive(Debug, Deserialize)]
pub struct LogCfg {
    /// Controller state record (TOML, atomically replaced).
    pub state_file: PathBuf,
    /// Append-only block transition audit log (CSV).
    pub block_log: PathBuf,
    /// OD input log; the last line holds the current reading.
    pub od_log: PathBuf,
}

/// `[logging]`: CLI process logging (not the block log).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub controller: ControllerCfg,
    pub log: LogCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let c = &self.controller;

        if c.chambers == 0 {
            eyre::bail!("controller.chambers must be > 0");
        }
        if c.setpoint.len() != c.chambers {
            eyre::bail!(
                "controller.setpoint has {} entries, expected {}",
                c.setpoint.len(),
                c.chambers
            );
        }
        if c.block_start.len() != c.chambers {
            eyre::bail!(
                "controller.block_start has {} entries, expected {}",
                c.block_start.len(),
                c.chambers
            );
        }
        for (i, v) in c.setpoint.iter().enumerate() {
            if !v.is_finite() || *v <= 0.0 {
                eyre::bail!("controller.setpoint[{i}] must be a positive finite OD");
            }
        }
        for (i, v) in c.block_start.iter().enumerate() {
            if !v.is_finite() || *v <= 0.0 {
                eyre::bail!("controller.block_start[{i}] must be a positive finite OD");
            }
        }

        if !c.ki.is_finite() || !c.kp.is_finite() {
            eyre::bail!("controller.ki and controller.kp must be finite");
        }
        if !c.min_dilution.is_finite() || c.min_dilution < 0.0 {
            eyre::bail!("controller.min_dilution must be >= 0");
        }
        if !c.max_dilution.is_finite() || c.max_dilution <= 0.0 {
            eyre::bail!("controller.max_dilution must be > 0");
        }
        if c.min_dilution > c.max_dilution {
            eyre::bail!("controller.min_dilution must not exceed controller.max_dilution");
        }
        if !c.integral_seed.is_finite() || c.integral_seed < 0.0 {
            eyre::bail!("controller.integral_seed must be >= 0");
        }

        for (name, v) in [
            ("growth_interval_hours", c.growth_interval_hours),
            ("dilution_interval_hours", c.dilution_interval_hours),
        ] {
            if let Some(h) = v
                && !(h.is_finite() && h > 0.0)
            {
                eyre::bail!("controller.{name} must be > 0");
            }
        }

        Ok(())
    }
}

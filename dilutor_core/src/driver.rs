//! The transition and persistence driver: executes exactly one tick.
//!
//! The driver is the only writer of the state store and the block log.
//! Everything it calls (state machines, PI pass) is a pure function
//! over values, so a tick behaves the same whether it runs as a
//! short-lived scheduled process or inside a long-running timer loop.
//! Concurrent ticks against the same stores are not supported; the
//! caller serializes invocations.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use dilutor_config::{Config, Mode};
use dilutor_traits::{Clock, OdReading, OdSource};

use crate::error::{Result, TickError};
use crate::pi::{self, PiParams};
use crate::state::{
    Block, BlockLogEntry, ControllerState, DEFAULT_INTERVAL_HOURS, PhaseTag,
};
use crate::store::{BlockLog, StateStore};
use crate::{chamber, schedule};

/// What a completed tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First tick: stores created, no state-machine evaluation.
    Bootstrapped,
    /// A phase transition was committed and logged.
    Transitioned,
    /// Idempotent no-op: nothing crossed a threshold, nothing written.
    NoChange,
}

/// Per-invocation knobs from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOptions {
    /// One-time delay before the first measurement of a fresh
    /// experiment; ignored once the baseline has been captured.
    pub startup_delay: Option<std::time::Duration>,
    /// Operator overrides, persisted into the state record.
    pub growth_interval_hours: Option<f64>,
    pub dilution_interval_hours: Option<f64>,
}

/// Run one tick of the configured phase machine.
pub fn run_tick<S: OdSource, C: Clock>(
    cfg: &Config,
    mode: Mode,
    store: &StateStore,
    block_log: &BlockLog,
    source: &mut S,
    clock: &C,
    opts: &TickOptions,
) -> Result<TickOutcome> {
    if !store.exists() {
        return bootstrap(cfg, mode, store, block_log, source, clock, opts);
    }

    let mut state = store.load()?;
    if state.phase.mode() != mode {
        return Err(TickError::ConfigMalformed(format!(
            "experiment was initialized in {} mode; remove {} to start over in {} mode",
            state.phase.mode(),
            store.path().display(),
            mode
        ))
        .into());
    }

    let mut config_changed = false;
    if !state.baseline_captured {
        // One-time capture for hand-seeded state files; never repeated.
        state.save_setpoint = state.setpoint.clone();
        state.baseline_captured = true;
        config_changed = true;
        apply_startup_delay(clock, opts);
        info!("captured baseline setpoints");
    }
    for (field, value) in [
        (&mut state.growth_interval_hours, opts.growth_interval_hours),
        (
            &mut state.dilution_interval_hours,
            opts.dilution_interval_hours,
        ),
    ] {
        if let Some(hours) = value
            && *field != hours
        {
            *field = hours;
            config_changed = true;
        }
    }

    let reading = read_ods(source, state.chambers)?;

    // A crash after the previous commit may have lost the CSV append;
    // bring the audit log back in line before anything else.
    if block_log.sync_tail(&state.last_entry)? {
        warn!(
            log = %block_log.path().display(),
            "block log was behind the committed state; repaired from the embedded tail"
        );
    }

    let now = clock.now();
    let mut candidate = state.clone();
    match &mut candidate.phase {
        PhaseTag::Chamber { phases } => {
            chamber::step(
                phases,
                &mut candidate.setpoint,
                &candidate.save_setpoint,
                &candidate.block_start,
                &reading.ods,
            );
        }
        PhaseTag::Schedule { block } => {
            let elapsed = now - state.last_entry.timestamp;
            if let Some(next) = schedule::step(
                *block,
                elapsed,
                schedule::interval(candidate.growth_interval_hours),
                schedule::interval(candidate.dilution_interval_hours),
            ) {
                *block = next;
                candidate.setpoint = match next {
                    Block::Growth => candidate.save_setpoint.clone(),
                    Block::Dilution => candidate.block_start.clone(),
                };
            }
        }
    }

    // The previous log row is the reference: identical setpoints mean
    // the candidate is discarded and nothing is written.
    if candidate.setpoint == state.last_entry.setpoint {
        if config_changed {
            store.commit(&state)?;
            info!("persisted operator config changes (no phase transition)");
        }
        debug!("no transition this tick");
        return Ok(TickOutcome::NoChange);
    }

    let entry = BlockLogEntry {
        timestamp: now,
        mode,
        setpoint: candidate.setpoint.clone(),
        elapsed_hours: hours_between(candidate.started_at, now),
        machine_time: reading.timestamp,
        ods: reading.ods.clone(),
    };
    candidate.last_entry = entry.clone();
    store.commit(&candidate)?;
    block_log.append(&entry)?;
    info!(mode = %mode, setpoint = ?entry.setpoint, "block transition committed");
    Ok(TickOutcome::Transitioned)
}

/// Per-chamber result of one dilution (PI) pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChamberCommand {
    pub chamber: usize,
    pub od: f64,
    pub setpoint: f64,
    /// `None` when the chamber's measurement was unavailable.
    pub dilution: Option<i64>,
}

/// Run one PI pass over all chambers and persist the integral terms.
///
/// This is the entry point the surrounding experiment loop invokes per
/// cycle; turning the returned commands into pump pulses is the
/// actuator's business.
pub fn run_dilution<S: OdSource>(
    store: &StateStore,
    source: &mut S,
) -> Result<Vec<ChamberCommand>> {
    let mut state = store.load()?;
    let reading = read_ods(source, state.chambers)?;

    let params = PiParams {
        ki: state.ki,
        kp: state.kp,
        min_dilution: state.min_dilution,
        max_dilution: state.max_dilution,
    };
    let before = state.integral_state.clone();
    let dilutions = pi::compute_all(
        &reading.ods,
        &state.setpoint,
        &mut state.integral_state,
        state.integral_seed,
        &params,
    );
    if state.integral_state != before {
        store.commit(&state)?;
    }

    let commands: Vec<ChamberCommand> = dilutions
        .into_iter()
        .enumerate()
        .map(|(i, dilution)| ChamberCommand {
            chamber: i,
            od: reading.ods[i],
            setpoint: state.setpoint[i],
            dilution,
        })
        .collect();
    for c in &commands {
        debug!(
            chamber = c.chamber,
            od = c.od,
            setpoint = c.setpoint,
            dilution = ?c.dilution,
            "dilution command"
        );
    }
    Ok(commands)
}

fn bootstrap<S: OdSource, C: Clock>(
    cfg: &Config,
    mode: Mode,
    store: &StateStore,
    block_log: &BlockLog,
    source: &mut S,
    clock: &C,
    opts: &TickOptions,
) -> Result<TickOutcome> {
    let c = &cfg.controller;
    apply_startup_delay(clock, opts);

    let reading = read_ods(source, c.chambers)?;
    let now = clock.now();

    let setpoint = c.setpoint.clone();
    let entry = BlockLogEntry {
        timestamp: now,
        mode,
        setpoint: setpoint.clone(),
        elapsed_hours: 0.0,
        machine_time: reading.timestamp,
        ods: reading.ods.clone(),
    };
    let state = ControllerState {
        chambers: c.chambers,
        save_setpoint: setpoint.clone(),
        setpoint,
        block_start: c.block_start.clone(),
        baseline_captured: true,
        phase: PhaseTag::initial(mode, c.chambers),
        ki: c.ki,
        kp: c.kp,
        min_dilution: c.min_dilution,
        max_dilution: c.max_dilution,
        growth_interval_hours: opts
            .growth_interval_hours
            .or(c.growth_interval_hours)
            .unwrap_or(DEFAULT_INTERVAL_HOURS),
        dilution_interval_hours: opts
            .dilution_interval_hours
            .or(c.dilution_interval_hours)
            .unwrap_or(DEFAULT_INTERVAL_HOURS),
        integral_seed: c.integral_seed,
        integral_state: Vec::new(),
        started_at: now,
        last_entry: entry.clone(),
    };

    store.commit(&state)?;
    block_log.append(&entry)?;
    info!(mode = %mode, chambers = c.chambers, "experiment bootstrapped");
    Ok(TickOutcome::Bootstrapped)
}

fn apply_startup_delay<C: Clock>(clock: &C, opts: &TickOptions) {
    if let Some(d) = opts.startup_delay
        && !d.is_zero()
    {
        info!(seconds = d.as_secs(), "startup delay before first measurement");
        clock.sleep(d);
    }
}

/// Fetch and gate one reading: exactly `chambers` entries, all finite.
/// The `0.0` sentinel passes through; NaN/Inf never reaches the
/// controllers.
fn read_ods<S: OdSource>(source: &mut S, chambers: usize) -> Result<OdReading> {
    let reading = source
        .read()
        .map_err(|e| TickError::OdSourceUnavailable(e.to_string()))?;
    if reading.ods.len() != chambers {
        return Err(TickError::OdInvalid(format!(
            "reading has {} chambers, expected {chambers}",
            reading.ods.len()
        ))
        .into());
    }
    if let Some((i, v)) = reading
        .ods
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(TickError::OdInvalid(format!("chamber {i}: od {v} is not finite")).into());
    }
    Ok(reading)
}

fn hours_between(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds() as f64 / 3_600_000.0
}

//! Command wiring: config mapping, store assembly, and tick/dilute execution.

use std::time::Duration;

use dilutor_config::{Config, Mode};
use dilutor_core::error::Result as CoreResult;
use dilutor_core::{
    BlockLog, ChamberCommand, StateStore, TailOdSource, TickError, TickOptions, TickOutcome,
};
use dilutor_traits::{OdSource, SystemClock};

/// Effective mode for this invocation: command-line flags win over the
/// config; exactly one must be selected somewhere.
pub fn resolve_mode(cfg: &Config, schedule: bool, chamber: bool) -> CoreResult<Mode> {
    match (schedule, chamber) {
        (true, false) => Ok(Mode::Schedule),
        (false, true) => Ok(Mode::Chamber),
        (false, false) => cfg.controller.mode.ok_or_else(|| {
            TickError::ConfigMalformed(
                "no mode selected: pass --schedule or --chamber, or set controller.mode".into(),
            )
            .into()
        }),
        // clap's conflicts_with rules this out before we get here
        (true, true) => unreachable!(),
    }
}

pub fn run_tick(
    cfg: &Config,
    mode: Mode,
    delay_minutes: Option<f64>,
    growth_interval: Option<f64>,
    dilution_interval: Option<f64>,
) -> CoreResult<TickOutcome> {
    let store = StateStore::new(&cfg.log.state_file);
    let block_log = BlockLog::new(&cfg.log.block_log);
    let mut source = TailOdSource::new(&cfg.log.od_log);
    let clock = SystemClock::new();
    let opts = TickOptions {
        startup_delay: delay_minutes
            .filter(|m| *m > 0.0)
            .map(|m| Duration::from_secs_f64(m * 60.0)),
        growth_interval_hours: growth_interval,
        dilution_interval_hours: dilution_interval,
    };
    tracing::info!(mode = %mode, "tick start");
    dilutor_core::run_tick(cfg, mode, &store, &block_log, &mut source, &clock, &opts)
}

pub fn run_dilute(cfg: &Config) -> CoreResult<Vec<ChamberCommand>> {
    let store = StateStore::new(&cfg.log.state_file);
    let mut source = TailOdSource::new(&cfg.log.od_log);
    dilutor_core::run_dilution(&store, &mut source)
}

/// Everything a tick touches must be reachable: OD source readable with
/// the right chamber count, and the state record (if one exists) loads
/// cleanly.
pub fn run_self_check(cfg: &Config) -> CoreResult<()> {
    let mut source = TailOdSource::new(&cfg.log.od_log);
    let reading = source
        .read()
        .map_err(|e| TickError::OdSourceUnavailable(e.to_string()))?;
    if reading.ods.len() != cfg.controller.chambers {
        return Err(TickError::OdInvalid(format!(
            "od log has {} chambers, config expects {}",
            reading.ods.len(),
            cfg.controller.chambers
        ))
        .into());
    }
    let store = StateStore::new(&cfg.log.state_file);
    if store.exists() {
        store.load()?;
    }
    Ok(())
}

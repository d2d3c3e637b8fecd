#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Dilution-control core for a multi-chamber turbidostat.
//!
//! The controller runs as a short-lived periodic process: an external
//! scheduler invokes one synchronous tick, which loads the persistent
//! state record, consults the newest OD reading, runs exactly one of
//! two phase state machines, and commits the outcome atomically. No
//! in-memory state survives between invocations; the state file and
//! the block log make the sequence of processes behave like one
//! continuously running state machine.
//!
//! ## Architecture
//!
//! - **PI controller**: OD error -> clamped dilution command with
//!   integral anti-windup (`pi` module)
//! - **Chamber mode**: per-chamber hysteresis relay around the
//!   setpoint (`chamber` module)
//! - **Schedule mode**: global wall-clock interval machine
//!   (`schedule` module)
//! - **Persistence**: atomic state commit + append-only block log with
//!   crash repair (`store` module)
//! - **Driver**: one tick end to end (`driver` module)
//!
//! Sensor and clock boundaries live in `dilutor_traits`; the typed
//! experiment configuration lives in `dilutor_config`.

// Module declarations
pub mod chamber;
pub mod driver;
pub mod error;
pub mod mocks;
pub mod od;
pub mod pi;
pub mod schedule;
pub mod state;
pub mod store;
pub mod util;

pub use driver::{ChamberCommand, TickOptions, TickOutcome, run_dilution, run_tick};
pub use error::TickError;
pub use od::TailOdSource;
pub use pi::{PiOutput, PiParams};
pub use state::{
    Block, BlockLogEntry, ControllerState, DEFAULT_INTERVAL_HOURS, HYSTERESIS_BAND, Mode, Phase,
    PhaseTag,
};
pub use store::{BlockLog, StateStore};

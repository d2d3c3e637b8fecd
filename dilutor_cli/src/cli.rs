//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dilutor", version, about = "Turbidostat dilution controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dilutor.toml")]
    pub config: PathBuf,

    /// Emit JSON (structured output and JSON log lines)
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one tick of the configured phase state machine
    Tick {
        /// Switch all chambers together on a wall-clock interval schedule
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "chamber")]
        schedule: bool,
        /// Switch each chamber from its own OD (hysteresis relay)
        #[arg(long, action = ArgAction::SetTrue)]
        chamber: bool,
        /// Delay the first measurement of a fresh experiment by this many minutes
        #[arg(long, value_name = "MINUTES")]
        delay: Option<f64>,
        /// Override the growth block length in hours (persisted into the state record)
        #[arg(long, value_name = "HOURS")]
        growth_interval: Option<f64>,
        /// Override the dilution block length in hours (persisted into the state record)
        #[arg(long, value_name = "HOURS")]
        dilution_interval: Option<f64>,
    },
    /// Run one PI dilution pass and print the per-chamber commands
    Dilute,
    /// Quick health check (config, stores and OD source readable)
    SelfCheck,
}

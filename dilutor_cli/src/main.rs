mod cli;
mod error_fmt;
mod run;

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use cli::{Cli, Commands, FILE_GUARD};
use dilutor_config::Config;
use dilutor_core::{TickError, TickOutcome};

fn main() -> ExitCode {
    let _ = color_eyre::install();
    let cli = Cli::parse();

    match real_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.json {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            let code = error_fmt::exit_code_for_error(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let text = match fs::read_to_string(&cli.config) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TickError::ConfigMissing(cli.config.display().to_string()).into());
        }
        Err(e) => {
            return Err(eyre::Report::new(e)
                .wrap_err(format!("read config file {}", cli.config.display())));
        }
    };
    let cfg =
        dilutor_config::load_toml(&text).map_err(|e| TickError::ConfigMalformed(e.to_string()))?;
    cfg.validate()
        .map_err(|e| TickError::ConfigMalformed(e.to_string()))?;

    init_logging(cli, &cfg);

    match &cli.cmd {
        Commands::Tick {
            schedule,
            chamber,
            delay,
            growth_interval,
            dilution_interval,
        } => {
            let mode = run::resolve_mode(&cfg, *schedule, *chamber)?;
            let outcome =
                run::run_tick(&cfg, mode, *delay, *growth_interval, *dilution_interval)?;
            let label = match outcome {
                TickOutcome::Bootstrapped => "bootstrapped",
                TickOutcome::Transitioned => "transition committed",
                TickOutcome::NoChange => "no change",
            };
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "outcome": label, "mode": mode.to_string() })
                );
            } else {
                println!("tick complete: {label}");
            }
        }
        Commands::Dilute => {
            let commands = run::run_dilute(&cfg)?;
            if cli.json {
                let rows: Vec<serde_json::Value> = commands
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "chamber": c.chamber,
                            "od": c.od,
                            "setpoint": c.setpoint,
                            "dilution": c.dilution,
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(rows));
            } else {
                for c in &commands {
                    match c.dilution {
                        Some(d) => println!(
                            "chamber {}: od {:.4} setpoint {:.4} dilution {d}",
                            c.chamber, c.od, c.setpoint
                        ),
                        None => println!(
                            "chamber {}: measurement unavailable, no command",
                            c.chamber
                        ),
                    }
                }
            }
        }
        Commands::SelfCheck => {
            run::run_self_check(&cfg)?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("self-check ok");
            }
        }
    }
    Ok(())
}

/// Console logging always goes to stderr (stdout carries command
/// output); an optional JSON-lines file layer comes from `[logging]`.
fn init_logging(cli: &Cli, cfg: &Config) {
    // An explicit --log-level wins; the config's level fills in when
    // the flag is left at its default.
    let level = if cli.log_level == "info" {
        cfg.logging.level.clone().unwrap_or_else(|| cli.log_level.clone())
    } else {
        cli.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file_layer = cfg.logging.file.as_deref().map(|path| {
        let path = std::path::Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("dilutor.log"), ToOwned::to_owned);
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| std::path::Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
}

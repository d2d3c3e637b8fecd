//! Human-readable error descriptions and structured JSON error formatting.

use dilutor_core::TickError;

pub fn error_kind_name(e: &TickError) -> &'static str {
    match e {
        TickError::ConfigMissing(_) => "ConfigMissing",
        TickError::ConfigMalformed(_) => "ConfigMalformed",
        TickError::OdSourceUnavailable(_) => "OdSourceUnavailable",
        TickError::OdInvalid(_) => "OdInvalid",
        TickError::LogStoreUnavailable(_) => "LogStoreUnavailable",
        TickError::InconsistentState(_) => "InconsistentState",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(te) = err.downcast_ref::<TickError>() {
        return match te {
            TickError::ConfigMissing(path) => format!(
                "What happened: A required file is missing ({path}).\nLikely causes: The config path is wrong, or `dilute` ran before the experiment was bootstrapped.\nHow to fix: Check --config and log.state_file, and run `dilutor tick` once to bootstrap a fresh experiment."
            ),
            TickError::ConfigMalformed(msg) => format!(
                "What happened: The configuration or state record is malformed ({msg}).\nLikely causes: Hand-edited TOML, mismatched vector lengths, or a mode change mid-experiment.\nHow to fix: Repair the file, or remove the state file to start a fresh experiment."
            ),
            TickError::OdSourceUnavailable(msg) => format!(
                "What happened: The OD log could not be read ({msg}).\nLikely causes: The sensor pipeline is not writing, or log.od_log points at the wrong file.\nHow to fix: Check that the OD pipeline is running and the path is correct."
            ),
            TickError::OdInvalid(msg) => format!(
                "What happened: The newest OD reading is unusable ({msg}).\nLikely causes: Sensor glitch producing NaN/Inf, or a chamber-count mismatch with the config.\nHow to fix: Verify the OD pipeline output format and controller.chambers."
            ),
            TickError::LogStoreUnavailable(msg) => format!(
                "What happened: The block log could not be written ({msg}).\nLikely causes: Missing directory, permissions, or a full disk.\nHow to fix: Check log.block_log and the filesystem, then rerun; no state was changed."
            ),
            TickError::InconsistentState(msg) => format!(
                "What happened: The persisted state contradicts itself ({msg}).\nLikely causes: One of the stores was edited or replaced outside the controller.\nHow to fix: Inspect state file and block log by hand; the controller will not guess which one is right."
            ),
        };
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {err}"
    )
}

/// Map TickError kinds to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(te) = err.downcast_ref::<TickError>() {
        return match te {
            TickError::ConfigMissing(_) => 2,
            TickError::ConfigMalformed(_) => 3,
            TickError::OdSourceUnavailable(_) => 4,
            TickError::OdInvalid(_) => 5,
            TickError::LogStoreUnavailable(_) => 6,
            TickError::InconsistentState(_) => 7,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let kind = err
        .downcast_ref::<TickError>()
        .map_or("Error", error_kind_name);
    json!({ "kind": kind, "message": humanize(err) }).to_string()
}

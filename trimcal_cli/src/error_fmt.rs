//! Human-readable error descriptions and structured JSON error formatting.

use trimcal_core::CalibError;

fn chain_text(err: &eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    let msg = chain_text(err);

    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CalibError>() {
        return match ce {
            CalibError::NoUnits => {
                "What happened: No units were selected for calibration.\nLikely causes: --units 0, or board.units = 0 in the config.\nHow to fix: Select at least one unit (e.g., `trimcal calibrate --units 1`).".to_string()
            }
            CalibError::Config(m) => format!(
                "What happened: Calibration policy is invalid ({m}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            CalibError::Report(m) => format!(
                "What happened: The report file could not be written ({m}).\nLikely causes: Missing directory or no write permission.\nHow to fix: Check output.report / output.dir and their permissions."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nDetails: {}\nHow to fix: Compare against etc/trimcal.toml; [board] with an address is required.",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or config
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing file.\nHow to fix: Pass an existing file with --config. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range or inconsistent values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("link error") || lower.contains("timeout") {
        return format!(
            "What happened: The front end did not answer.\nLikely causes: Link down or board not powered.\nHow to fix: Check the connection and rerun with --log-level=debug. Original: {msg}"
        );
    }

    if lower.contains("channel csv must have headers") {
        return "Invalid headers in channel CSV.".to_string();
    }

    // Generic fallback
    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Configuration problems are usage errors (2); everything else is a runtime error (1).
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    let usage = matches!(err.downcast_ref::<CalibError>(), Some(CalibError::Config(_)))
        || err.downcast_ref::<toml::de::Error>().is_some()
        || chain_text(err)
            .to_ascii_lowercase()
            .contains("invalid configuration");
    if usage { 2 } else { 1 }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CalibError>() {
        Some(CalibError::NoUnits) => "NoUnits",
        Some(CalibError::Report(_)) => "Report",
        _ if exit_code_for_error(err) == 2 => "Config",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}

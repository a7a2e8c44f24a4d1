//! Human-readable error descriptions, exit codes and structured JSON errors.

use servo_core::error::{CommandError, ConnectError, ExportError, LinkError};

use crate::run::RunError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<ConnectError>() {
        return format!(
            "What happened: Could not open serial port {} ({}).\nLikely causes: Wrong port name, device unplugged, or the port is held by another program.\nHow to fix: Run `servo ports` to list ports, then pass --port or set [serial] port in the config.",
            ce.port, ce.reason
        );
    }

    if let Some(cmd) = err.downcast_ref::<CommandError>() {
        return match cmd {
            CommandError::InvalidTarget(a) => format!(
                "What happened: Target angle {a} was rejected.\nLikely causes: The angle is outside 0..=180.\nHow to fix: Pass --angle between 0 and 180."
            ),
            CommandError::InvalidSpeed(s) => format!(
                "What happened: Speed {s} was rejected.\nLikely causes: Speed must be 1 (fast) through 5 (slow).\nHow to fix: Pass --speed 1..5 or fix [control] default_speed."
            ),
            CommandError::NotConnected => {
                "What happened: The command was not sent because the serial link is down.\nLikely causes: The device was unplugged or an earlier I/O error faulted the link.\nHow to fix: Reconnect the device and rerun.".to_string()
            }
            CommandError::Send(le) => format!(
                "What happened: The command could not be written to the servo ({le}).\nLikely causes: Cable disconnected, wrong baud rate, or write timeout too low.\nHow to fix: Check the cable and [serial] settings, then rerun."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LinkError>() {
        return format!(
            "What happened: The serial link failed ({le}).\nLikely causes: The device was unplugged or reset during the run.\nHow to fix: Reconnect the device and rerun."
        );
    }

    if let Some(re) = err.downcast_ref::<RunError>() {
        return match re {
            RunError::TargetTimeout { angle, waited_ms } => format!(
                "What happened: The servo did not report reaching {angle} deg within {waited_ms} ms; it was told to stop.\nLikely causes: Slow speed setting, mechanical load, or firmware not sending TARGET_REACHED.\nHow to fix: Raise --timeout-ms, use a faster --speed, or check the servo."
            ),
            RunError::Interrupted => {
                "What happened: Interrupted by Ctrl-C; the servo was told to stop.".to_string()
            }
            RunError::SelfCheck(why) => format!(
                "What happened: Self-check failed ({why}).\nLikely causes: A regression in the control loop.\nHow to fix: Re-run with --log-level=debug and inspect the log."
            ),
        };
    }

    if let Some(xe) = err.downcast_ref::<ExportError>() {
        return format!(
            "What happened: CSV export failed ({xe}).\nLikely causes: The target directory does not exist or is not writable.\nHow to fix: Pick a writable path for --export."
        );
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("parse config") || lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be loaded ({msg}).\nLikely causes: TOML syntax error or a value of the wrong type.\nHow to fix: Fix the file or point --config at a valid one."
        );
    }

    if lower.contains(" must ") || lower.contains("unreasonably large") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: An out-of-range value in the TOML or on the command line.\nHow to fix: Edit the config file, then rerun."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 connection, 3 target timeout, 4 command rejected, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<ConnectError>().is_some() || err.downcast_ref::<LinkError>().is_some() {
        return 2;
    }
    if let Some(cmd) = err.downcast_ref::<CommandError>() {
        return match cmd {
            CommandError::InvalidTarget(_) | CommandError::InvalidSpeed(_) => 4,
            CommandError::NotConnected | CommandError::Send(_) => 2,
        };
    }
    if let Some(RunError::TargetTimeout { .. }) = err.downcast_ref::<RunError>() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<ConnectError>().is_some() {
        return "ConnectFailed";
    }
    if err.downcast_ref::<LinkError>().is_some() {
        return "LinkFaulted";
    }
    if let Some(cmd) = err.downcast_ref::<CommandError>() {
        return match cmd {
            CommandError::InvalidTarget(_) => "InvalidTarget",
            CommandError::InvalidSpeed(_) => "InvalidSpeed",
            CommandError::NotConnected => "NotConnected",
            CommandError::Send(_) => "SendFailed",
        };
    }
    if let Some(re) = err.downcast_ref::<RunError>() {
        return match re {
            RunError::TargetTimeout { .. } => "TargetTimeout",
            RunError::Interrupted => "Interrupted",
            RunError::SelfCheck(_) => "SelfCheckFailed",
        };
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    if let Some(RunError::TargetTimeout { angle, waited_ms }) = err.downcast_ref::<RunError>() {
        return json!({
            "reason": reason_name(err),
            "details": { "angle": angle, "waited_ms": waited_ms },
            "message": msg,
        })
        .to_string();
    }
    json!({ "reason": reason_name(err), "message": msg }).to_string()
}

//! Line protocol spoken with the servo controller.
//!
//! Outgoing: `START,<angle>,<speed>`, `STOP`, `RESET,<angle>`, newline terminated.
//! Incoming: `Angle:<float>` feedback and `TARGET_REACHED`; anything else is
//! ignored so newer firmware can add lines without breaking older hosts.

use crate::error::ParseError;
use crate::types::Speed;

const FEEDBACK_PREFIX: &str = "Angle";
const TARGET_REACHED: &str = "TARGET_REACHED";

/// A classified incoming line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    FeedbackAngle(f64),
    TargetReached,
    /// An `Angle` line whose payload did not parse.
    Malformed { line: String, reason: ParseError },
    Unrecognized(String),
    Empty,
}

pub fn encode_start(servo_angle: u16, speed: Speed) -> String {
    format!("START,{servo_angle},{}\n", speed.get())
}

pub fn encode_stop() -> String {
    "STOP\n".to_string()
}

pub fn encode_reset(angle: u16) -> String {
    format!("RESET,{angle}\n")
}

/// Classify one line. Total: every input maps to an event.
pub fn decode(line: &str) -> ProtocolEvent {
    let line = line.trim();
    if line.is_empty() {
        return ProtocolEvent::Empty;
    }
    if line.starts_with(TARGET_REACHED) {
        return ProtocolEvent::TargetReached;
    }
    if let Some(rest) = line.strip_prefix(FEEDBACK_PREFIX) {
        return match parse_angle_payload(rest) {
            Ok(v) => ProtocolEvent::FeedbackAngle(v),
            Err(reason) => ProtocolEvent::Malformed {
                line: line.to_string(),
                reason,
            },
        };
    }
    ProtocolEvent::Unrecognized(line.to_string())
}

fn parse_angle_payload(rest: &str) -> Result<f64, ParseError> {
    let payload = rest
        .strip_prefix(':')
        .ok_or(ParseError::MissingSeparator)?
        .trim();
    match payload.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::InvalidNumber(payload.to_string())),
    }
}

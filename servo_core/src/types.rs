//! Small value types shared by the session and its collaborators.

use std::fmt;

use crate::error::CommandError;

/// Largest GUI-facing target angle.
pub const MAX_ANGLE: u16 = 180;

/// Rotation sense chosen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl Direction {
    /// Map a GUI target in `0..=180` to the angle the servo is sent.
    #[inline]
    pub fn servo_angle(self, gui_angle: u16) -> u16 {
        match self {
            Direction::Clockwise => gui_angle,
            Direction::CounterClockwise => MAX_ANGLE.saturating_sub(gui_angle),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Clockwise => "Clockwise",
            Direction::CounterClockwise => "Counter-CW",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Stopped => "Stopped",
            SessionState::Running => "Running",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// An I/O error occurred; only an explicit reopen leaves this state.
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connected => "Connected",
            ConnectionState::Faulted => "Faulted",
        })
    }
}

/// Motion speed, 1 (fast) through 5 (slow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed(u8);

impl Speed {
    pub const FASTEST: Speed = Speed(1);
    pub const SLOWEST: Speed = Speed(5);

    pub fn new(v: u8) -> Result<Self, CommandError> {
        if (Self::FASTEST.0..=Self::SLOWEST.0).contains(&v) {
            Ok(Self(v))
        } else {
            Err(CommandError::InvalidSpeed(v))
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::FASTEST
    }
}

impl TryFrom<u8> for Speed {
    type Error = CommandError;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

/// Everything a status panel shows, read atomically from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pub gui_angle: u16,
    pub servo_angle: u16,
    pub direction: Direction,
    pub session_state: SessionState,
    pub connection_state: ConnectionState,
    /// Latest feedback angle, if any arrived since the last reset.
    pub current_feedback: Option<f64>,
    /// Last commanded angle minus latest feedback.
    pub current_error: Option<f64>,
}

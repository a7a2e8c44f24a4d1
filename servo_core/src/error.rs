use thiserror::Error;

/// Opening the link failed. Non-fatal: the session keeps running disconnected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot open {port}: {reason}")]
pub struct ConnectError {
    pub port: String,
    pub reason: String,
}

/// Write or read failure on an open link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,
    #[error("link is faulted; reopen required")]
    Faulted,
    #[error("io error: {0}")]
    Io(String),
}

/// Why an `Angle:` line could not be turned into a feedback value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing ':' separator")]
    MissingSeparator,
    #[error("invalid angle payload {0:?}")]
    InvalidNumber(String),
}

/// A command the session refused or could not deliver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("serial port not connected")]
    NotConnected,
    #[error("speed {0} out of range 1..=5")]
    InvalidSpeed(u8),
    #[error("target angle {0} out of range 0..=180")]
    InvalidTarget(u16),
    #[error("failed to send command: {0}")]
    Send(#[from] LinkError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

//! Runtime configuration for the session core.
//!
//! These are the structs the core consumes. They are separate from the
//! TOML-deserialized config in `servo_config`; see `conversions`.

use std::time::Duration;

/// How to open the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCfg {
    pub port: String,
    pub baud: u32,
    /// Upper bound on a single `read_line` wait.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(2000),
        }
    }
}

/// Background ingestion pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestCfg {
    /// Wait per `read_line` call while connected.
    pub read_timeout: Duration,
    /// Sleep per iteration while the link is absent or faulted.
    pub idle_backoff: Duration,
}

impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            idle_backoff: Duration::from_millis(10),
        }
    }
}

/// Who feeds received lines into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// A dedicated thread reads the link.
    #[default]
    Background,
    /// No thread; the caller drives ingestion with `ControlSession::pump`.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCfg {
    /// Samples retained before eviction.
    pub buffer_capacity: usize,
    /// Target and commanded angle after a reset.
    pub home_angle: u16,
    /// Depth of the event queue handed out by `subscribe`.
    pub event_queue: usize,
    pub ingest: IngestCfg,
    pub ingest_mode: IngestMode,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            home_angle: 90,
            event_queue: 256,
            ingest: IngestCfg::default(),
            ingest_mode: IngestMode::Background,
        }
    }
}

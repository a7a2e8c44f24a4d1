//! `From` implementations bridging `servo_config` types to runtime config.

use std::time::Duration;

use crate::config::{IngestCfg, IngestMode, LinkCfg, SessionCfg};

// ── LinkCfg ──────────────────────────────────────────────────────────────────

impl From<&servo_config::Serial> for LinkCfg {
    fn from(c: &servo_config::Serial) -> Self {
        Self {
            port: c.port.clone(),
            baud: c.baud,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            write_timeout: Duration::from_millis(c.write_timeout_ms),
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<&servo_config::Config> for SessionCfg {
    fn from(c: &servo_config::Config) -> Self {
        Self {
            buffer_capacity: c.buffer.capacity,
            home_angle: c.control.home_angle,
            event_queue: c.ingest.event_queue,
            ingest: IngestCfg {
                read_timeout: Duration::from_millis(c.serial.read_timeout_ms),
                idle_backoff: Duration::from_millis(c.ingest.idle_backoff_ms),
            },
            ingest_mode: IngestMode::Background,
        }
    }
}

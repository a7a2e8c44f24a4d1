#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the servo control stack.
//!
//! Every section has defaults, so an empty file is a valid config. Values
//! are range-checked by `Config::validate` before use.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Serial {
    /// OS port identifier, e.g. "/dev/ttyUSB0" or "COM9"
    pub port: String,
    pub baud: u32,
    /// Per-read wait before a read reports "no data"
    pub read_timeout_ms: u64,
    /// Per-write wait before a write counts as failed
    pub write_timeout_ms: u64,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout_ms: 1000,
            write_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Buffer {
    /// Samples retained before the oldest is evicted
    pub capacity: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Ingest {
    /// Sleep between polls while the link is not connected
    pub idle_backoff_ms: u64,
    /// Bounded depth of the session event queue; overflow is dropped
    pub event_queue: usize,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 10,
            event_queue: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Display {
    /// Status refresh period for collaborators polling the session
    pub update_interval_ms: u64,
    /// Plot refresh period. Reserved for a plotting front end drawing the
    /// sample series; the CLI does not plot and never reads it.
    pub plot_update_interval_ms: u64,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            update_interval_ms: 100,
            plot_update_interval_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Control {
    /// Speed used when a command does not name one (1 = fast, 5 = slow)
    pub default_speed: u8,
    /// Angle restored by a reset
    pub home_angle: u16,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            default_speed: 1,
            home_angle: 90,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub serial: Serial,
    pub buffer: Buffer,
    pub ingest: Ingest,
    pub display: Display,
    pub control: Control,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }
        if self.serial.write_timeout_ms == 0 {
            eyre::bail!("serial.write_timeout_ms must be >= 1");
        }
        if self.serial.read_timeout_ms > 60_000 || self.serial.write_timeout_ms > 60_000 {
            eyre::bail!("serial timeouts are unreasonably large (>60s)");
        }

        // Buffer
        if self.buffer.capacity == 0 {
            eyre::bail!("buffer.capacity must be >= 1");
        }
        if self.buffer.capacity > 1_000_000 {
            eyre::bail!("buffer.capacity is unreasonably large (>1000000)");
        }

        // Ingest
        if self.ingest.idle_backoff_ms == 0 {
            eyre::bail!("ingest.idle_backoff_ms must be >= 1");
        }
        if self.ingest.idle_backoff_ms > 1000 {
            eyre::bail!("ingest.idle_backoff_ms must be <= 1000");
        }
        if self.ingest.event_queue == 0 {
            eyre::bail!("ingest.event_queue must be >= 1");
        }

        // Display
        if self.display.update_interval_ms == 0 {
            eyre::bail!("display.update_interval_ms must be >= 1");
        }
        if self.display.plot_update_interval_ms == 0 {
            eyre::bail!("display.plot_update_interval_ms must be >= 1");
        }

        // Control
        if !(1..=5).contains(&self.control.default_speed) {
            eyre::bail!("control.default_speed must be in 1..=5");
        }
        if self.control.home_angle > 180 {
            eyre::bail!("control.home_angle must be in 0..=180");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot}");
        }

        Ok(())
    }
}

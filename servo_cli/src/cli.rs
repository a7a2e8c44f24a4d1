//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "servo", version, about = "Servo serial control CLI")]
pub struct Cli {
    /// Path to config TOML; built-in defaults are used if it does not exist
    #[arg(long, value_name = "FILE", default_value = "etc/servo_config.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Talk to the built-in simulated servo instead of a serial port
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Serial port; overrides [serial] port
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Baud rate; overrides [serial] baud
    #[arg(long, value_name = "BAUD")]
    pub baud: Option<u32>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports visible to the OS
    Ports,
    /// Move to a target angle and wait until the servo reports it reached
    Move {
        /// Target angle in degrees (0..=180)
        #[arg(long)]
        angle: u16,
        /// 1 (fast) to 5 (slow); defaults to [control] default_speed
        #[arg(long)]
        speed: Option<u8>,
        /// Rotate counter-clockwise (sends 180 - angle)
        #[arg(long, action = ArgAction::SetTrue)]
        ccw: bool,
        /// Give up, stop and exit 3 if the target is not reached in time
        #[arg(long, value_name = "MS", default_value_t = 10_000)]
        timeout_ms: u64,
        /// Write recorded samples to this CSV file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },
    /// Listen to feedback without commanding motion
    Monitor {
        /// How long to listen
        #[arg(long, value_name = "MS")]
        duration_ms: u64,
        /// Write recorded samples to this CSV file
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },
    /// Return the servo to its home angle
    Reset,
    /// Run a short move against the simulator and verify the control loop
    SelfCheck,
}

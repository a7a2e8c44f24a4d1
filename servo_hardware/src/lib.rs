//! Device-facing transports for the servo link.
//!
//! - `serial`: real ports through the `serialport` crate
//! - `sim`: an in-memory servo for tests, demos and `--sim` runs
pub mod error;
pub mod serial;
pub mod sim;

pub use error::HwError;
pub use serial::{PortEntry, SerialTransport, list_ports};
pub use sim::SimulatedServo;

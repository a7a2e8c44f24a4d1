#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Servo control core (UI-agnostic).
//!
//! Talks a newline-delimited text protocol to a servo controller over a
//! serial link, records commanded-vs-feedback samples, and keeps the run
//! state the operator sees. All device I/O goes through
//! `servo_traits::Transport`.
//!
//! ## Architecture
//!
//! - **Codec**: command encoding and line classification (`codec`)
//! - **Link**: serial connection with fault tracking (`link`)
//! - **Buffer**: bounded sample store with cached statistics (`buffer`)
//! - **Session**: state machine and composition root (`session`)
//! - **Ingestion**: background reader thread (`ingest`)
//!
//! Lock order inside the session is control state, then buffer; link locks
//! are innermost.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod conversions;
pub mod error;
pub mod ingest;
pub mod link;
pub mod mocks;
pub mod session;
pub mod types;
pub mod util;

pub use buffer::{CSV_HEADER, Sample, SampleBuffer, Statistics};
pub use codec::ProtocolEvent;
pub use config::{IngestCfg, IngestMode, LinkCfg, SessionCfg};
pub use error::{CommandError, ConnectError, ExportError, LinkError, ParseError};
pub use link::SerialLink;
pub use session::{ControlSession, Ingested, SessionEvent};
pub use types::{ConnectionState, Direction, DisplayState, MAX_ANGLE, SessionState, Speed};

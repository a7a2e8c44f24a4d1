//! Control session: the composition root of the core.
//!
//! Holds the operator's choices (target, direction), the run state, the last
//! commanded servo angle and the sample buffer, and turns decoded protocol
//! lines into samples and state transitions.
//!
//! Locking: `commands` is taken before `control`, which is taken before
//! `buffer`. Device writes happen with only `commands` held, so readers of
//! the control state never wait on the serial port.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use servo_traits::clock::{Clock, SystemClock};
use tracing::{debug, info, warn};

use crate::buffer::{Sample, SampleBuffer, Statistics};
use crate::codec::{self, ProtocolEvent};
use crate::config::{IngestMode, SessionCfg};
use crate::error::{CommandError, ConnectError, ExportError};
use crate::ingest::{IngestTarget, Ingestor};
use crate::link::SerialLink;
use crate::types::{ConnectionState, Direction, DisplayState, MAX_ANGLE, SessionState, Speed};
use crate::util::lock;

/// Pushed to subscribers as things happen on the ingestion side.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A feedback angle arrived. `sample` is set when it was recorded.
    Feedback {
        feedback: f64,
        sample: Option<Sample>,
    },
    /// The device reported the target reached while running.
    AutoStopped,
    LinkFaulted,
}

/// Outcome of feeding one line to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Sample(Sample),
    /// Feedback before any command was sent; shown but not recorded.
    Feedback(f64),
    AutoStopped,
    Ignored,
}

#[derive(Debug)]
struct ControlState {
    session: SessionState,
    direction: Direction,
    target: u16,
    last_commanded: Option<u16>,
    last_feedback: Option<f64>,
}

/// Send attempts before `emit` gives up on a queue other senders keep full.
const EMIT_ATTEMPTS: usize = 4;

struct Shared {
    /// Serializes commands that update `last_commanded`, so commits land in
    /// the order the writes went out.
    commands: Mutex<()>,
    control: Mutex<ControlState>,
    buffer: Mutex<SampleBuffer>,
    link: RwLock<Option<Arc<SerialLink>>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    home_angle: u16,
}

impl Shared {
    fn current_link(&self) -> Option<Arc<SerialLink>> {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queue `event`, evicting the oldest queued events when full so the
    /// newest state transition is always delivered.
    fn emit(&self, event: SessionEvent) {
        let mut event = event;
        for _ in 0..EMIT_ATTEMPTS {
            match self.events_tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(ev)) => {
                    if let Ok(old) = self.events_rx.try_recv() {
                        debug!(?old, "event queue full; dropped oldest event");
                    }
                    event = ev;
                }
                // We hold a receiver ourselves, so this cannot happen.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        debug!(?event, "event queue contended; dropping event");
    }

    fn apply_line(&self, line: &str) -> Ingested {
        match codec::decode(line) {
            ProtocolEvent::FeedbackAngle(feedback) => {
                let sample = {
                    let mut ctl = lock(&self.control);
                    ctl.last_feedback = Some(feedback);
                    ctl.last_commanded
                        .map(|c| lock(&self.buffer).push(f64::from(c), feedback, None))
                };
                self.emit(SessionEvent::Feedback { feedback, sample });
                match sample {
                    Some(s) => Ingested::Sample(s),
                    None => Ingested::Feedback(feedback),
                }
            }
            ProtocolEvent::TargetReached => {
                let was_running = {
                    let mut ctl = lock(&self.control);
                    std::mem::replace(&mut ctl.session, SessionState::Stopped)
                        == SessionState::Running
                };
                if was_running {
                    info!("target reached; session stopped");
                    self.emit(SessionEvent::AutoStopped);
                    Ingested::AutoStopped
                } else {
                    debug!("target reached while stopped; ignored");
                    Ingested::Ignored
                }
            }
            ProtocolEvent::Malformed { line, reason } => {
                warn!(%line, %reason, "malformed feedback line");
                Ingested::Ignored
            }
            ProtocolEvent::Unrecognized(line) => {
                debug!(%line, "unrecognized line");
                Ingested::Ignored
            }
            ProtocolEvent::Empty => Ingested::Ignored,
        }
    }
}

impl IngestTarget for Shared {
    fn link(&self) -> Option<Arc<SerialLink>> {
        self.current_link()
    }

    fn ingest_line(&self, line: &str) {
        let _ = self.apply_line(line);
    }

    fn link_faulted(&self) {
        warn!("serial link faulted; reconnect required");
        self.emit(SessionEvent::LinkFaulted);
    }
}

/// One operator session against one servo.
///
/// Commands run on the caller's thread; received lines are applied by a
/// background thread (or by `pump` in manual mode). Every method takes
/// `&self`, so the session can be shared behind an `Arc`.
pub struct ControlSession {
    shared: Arc<Shared>,
    ingest: Option<Ingestor>,
}

impl core::fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlSession")
            .field("display", &self.display_state())
            .field("ingesting", &self.ingest.is_some())
            .finish()
    }
}

impl ControlSession {
    /// Start a session. `link` may be `None` when the initial connect
    /// failed; commands then report `NotConnected` until `attach_link`.
    pub fn new(link: Option<SerialLink>, cfg: SessionCfg) -> Self {
        Self::with_clock(link, cfg, Arc::new(SystemClock::new()))
    }

    /// Like `new`, stamping samples with `clock`.
    pub fn with_clock(
        link: Option<SerialLink>,
        cfg: SessionCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(cfg.event_queue.max(1));
        let shared = Arc::new(Shared {
            commands: Mutex::new(()),
            control: Mutex::new(ControlState {
                session: SessionState::Stopped,
                direction: Direction::Clockwise,
                target: cfg.home_angle,
                last_commanded: None,
                last_feedback: None,
            }),
            buffer: Mutex::new(SampleBuffer::with_clock(cfg.buffer_capacity, clock)),
            link: RwLock::new(link.map(Arc::new)),
            events_tx,
            events_rx,
            home_angle: cfg.home_angle,
        });
        let ingest = match cfg.ingest_mode {
            IngestMode::Background => Some(Ingestor::spawn(
                shared.clone(),
                cfg.ingest.clone(),
                Arc::new(SystemClock::new()),
            )),
            IngestMode::Manual => None,
        };
        debug!(
            capacity = cfg.buffer_capacity,
            mode = ?cfg.ingest_mode,
            "session created"
        );
        Self { shared, ingest }
    }

    /// Replace the link, closing any previous one.
    pub fn attach_link(&self, link: SerialLink) {
        let old = self
            .shared
            .link
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::new(link));
        if let Some(old) = old {
            old.close();
        }
    }

    /// Reopen the current link after a fault or close.
    pub fn reconnect(&self) -> Result<(), ConnectError> {
        let Some(link) = self.shared.current_link() else {
            return Err(ConnectError {
                port: String::new(),
                reason: "no link attached".to_string(),
            });
        };
        link.reopen()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared
            .current_link()
            .map_or(ConnectionState::Disconnected, |l| l.state())
    }

    pub fn set_direction(&self, direction: Direction) {
        lock(&self.shared.control).direction = direction;
    }

    pub fn set_target(&self, gui_angle: u16) -> Result<(), CommandError> {
        if gui_angle > MAX_ANGLE {
            return Err(CommandError::InvalidTarget(gui_angle));
        }
        lock(&self.shared.control).target = gui_angle;
        Ok(())
    }

    /// Send the current target at `speed`.
    ///
    /// The write happens outside the control lock; run state and commanded
    /// angle are then committed together. Feedback that lands before the
    /// commit is stamped with the previous commanded angle.
    pub fn start(&self, speed: Speed) -> Result<(), CommandError> {
        let link = self
            .shared
            .current_link()
            .filter(|l| l.is_connected())
            .ok_or(CommandError::NotConnected)?;
        let _commands = lock(&self.shared.commands);
        let (gui_angle, direction) = {
            let ctl = lock(&self.shared.control);
            (ctl.target, ctl.direction)
        };
        let servo_angle = direction.servo_angle(gui_angle);
        let sent = link.write(codec::encode_start(servo_angle, speed).as_bytes());

        let mut ctl = lock(&self.shared.control);
        if let Err(e) = sent {
            ctl.session = SessionState::Stopped;
            warn!(servo_angle, speed = speed.get(), error = %e, "start command not sent");
            return Err(CommandError::Send(e));
        }
        ctl.session = SessionState::Running;
        ctl.last_commanded = Some(servo_angle);
        info!(
            gui_angle,
            servo_angle,
            speed = speed.get(),
            %direction,
            "start sent"
        );
        Ok(())
    }

    /// Stop locally, then tell the device if possible.
    pub fn stop(&self) {
        lock(&self.shared.control).session = SessionState::Stopped;
        self.send_best_effort("stop", &codec::encode_stop());
    }

    /// Clear data and return every setting to its home value.
    pub fn reset(&self) {
        let home = self.shared.home_angle;
        let _commands = lock(&self.shared.commands);
        {
            let mut ctl = lock(&self.shared.control);
            lock(&self.shared.buffer).clear();
            ctl.direction = Direction::Clockwise;
            ctl.target = home;
            ctl.session = SessionState::Stopped;
            ctl.last_commanded = Some(home);
            ctl.last_feedback = None;
        }
        info!(home_angle = home, "session reset");
        self.send_best_effort("reset", &codec::encode_reset(home));
    }

    /// Drop recorded samples, leaving control state alone.
    pub fn clear_data(&self) {
        lock(&self.shared.buffer).clear();
        debug!("sample data cleared");
    }

    fn send_best_effort(&self, what: &'static str, line: &str) {
        match self.shared.current_link() {
            Some(link) => {
                if let Err(e) = link.write(line.as_bytes()) {
                    warn!(command = what, error = %e, "command not delivered");
                }
            }
            None => debug!(command = what, "no link; command applied locally only"),
        }
    }

    /// Apply one received line.
    pub fn ingest_line(&self, line: &str) -> Ingested {
        self.shared.apply_line(line)
    }

    /// Read and apply at most one line, waiting up to `timeout`. For manual
    /// ingestion mode; returns `None` if nothing arrived.
    pub fn pump(&self, timeout: Duration) -> Option<Ingested> {
        let link = self.shared.current_link()?;
        let line = link.read_line(timeout)?;
        Some(self.shared.apply_line(&line))
    }

    /// Consistent view of everything a status panel shows.
    pub fn display_state(&self) -> DisplayState {
        let connection_state = self.connection_state();
        let ctl = lock(&self.shared.control);
        DisplayState {
            gui_angle: ctl.target,
            servo_angle: ctl.direction.servo_angle(ctl.target),
            direction: ctl.direction,
            session_state: ctl.session,
            connection_state,
            current_feedback: ctl.last_feedback,
            current_error: ctl
                .last_commanded
                .zip(ctl.last_feedback)
                .map(|(c, f)| f64::from(c) - f),
        }
    }

    pub fn session_state(&self) -> SessionState {
        lock(&self.shared.control).session
    }

    pub fn statistics(&self) -> Option<Statistics> {
        lock(&self.shared.buffer).statistics()
    }

    /// Oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        lock(&self.shared.buffer).snapshot()
    }

    pub fn sample_count(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    /// Write the retained samples to `path` as CSV.
    pub fn export_csv(&self, path: &Path) -> Result<(), ExportError> {
        lock(&self.shared.buffer).export_csv_file(path)
    }

    /// Receiver for session events. Receivers share one queue, so each
    /// event goes to exactly one of them.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events_rx.clone()
    }

    /// Lines applied by the background thread so far.
    pub fn lines_ingested(&self) -> u64 {
        self.ingest.as_ref().map_or(0, Ingestor::lines_read)
    }

    /// Stop ingestion and close the link. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(ingest) = &self.ingest {
            ingest.request_shutdown();
        }
        if let Some(link) = self.shared.current_link() {
            link.close();
        }
        // joins the thread
        drop(self.ingest.take());
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

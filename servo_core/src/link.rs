//! Serial link with fault tracking.
//!
//! The link owns a read half and a write half behind separate mutexes so the
//! ingestion thread and the command path never block each other. Connection
//! state sits behind its own mutex: a fault seen by either half is visible to
//! the other on its next call. Nothing here reconnects on its own; `reopen`
//! is the only way out of `Faulted`.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use servo_hardware::{SerialTransport, SimulatedServo};
use servo_traits::{BoxError, Transport, TransportPair};
use tracing::{debug, error, info, warn};

use crate::config::LinkCfg;
use crate::error::{ConnectError, LinkError};
use crate::types::ConnectionState;
use crate::util::lock;

/// Longest single blocking read, so `close` is noticed promptly.
pub const READ_SLICE: Duration = Duration::from_millis(50);
/// Bytes without a terminator after which the pending data is flushed as a line.
pub const MAX_LINE_LEN: usize = 4096;
const READ_CHUNK: usize = 256;

type Opener = Box<dyn Fn() -> Result<TransportPair, BoxError> + Send + Sync>;

#[derive(Default)]
struct ReadHalf {
    transport: Option<Box<dyn Transport>>,
    pending: Vec<u8>,
}

impl ReadHalf {
    fn take_line(&mut self) -> Option<String> {
        let end = match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None if self.pending.len() >= MAX_LINE_LEN => self.pending.len(),
            None => return None,
        };
        let raw: Vec<u8> = self.pending.drain(..end).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    fn release(&mut self) {
        self.transport = None;
        self.pending.clear();
    }
}

pub struct SerialLink {
    name: String,
    opener: Opener,
    state: Mutex<ConnectionState>,
    reader: Mutex<ReadHalf>,
    writer: Mutex<Option<Box<dyn Transport>>>,
}

impl core::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl SerialLink {
    /// Open the configured serial port. One attempt; no retry.
    pub fn open(cfg: &LinkCfg) -> Result<Self, ConnectError> {
        let c = cfg.clone();
        Self::with_opener(cfg.port.clone(), move || {
            SerialTransport::open_pair(&c.port, c.baud, c.read_timeout, c.write_timeout)
                .map_err(BoxError::from)
        })
    }

    /// Connect to an in-memory simulated servo.
    pub fn simulated(servo: &SimulatedServo) -> Result<Self, ConnectError> {
        let servo = servo.clone();
        Self::with_opener("sim", move || servo.open().map_err(BoxError::from))
    }

    /// Open through `opener`, which is kept for `reopen`.
    pub fn with_opener<F>(name: impl Into<String>, opener: F) -> Result<Self, ConnectError>
    where
        F: Fn() -> Result<TransportPair, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let pair = opener().map_err(|e| {
            warn!(port = %name, error = %e, "serial connection failed");
            ConnectError {
                port: name.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(port = %name, "connected");
        Ok(Self {
            name,
            opener: Box::new(opener),
            state: Mutex::new(ConnectionState::Connected),
            reader: Mutex::new(ReadHalf {
                transport: Some(pair.reader),
                pending: Vec::new(),
            }),
            writer: Mutex::new(Some(pair.writer)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn mark_faulted(&self, op: &'static str, e: &BoxError) {
        let mut st = lock(&self.state);
        if *st == ConnectionState::Connected {
            *st = ConnectionState::Faulted;
            error!(port = %self.name, op, error = %e, "serial I/O failed; link faulted");
        }
    }

    /// Send `bytes`. Short-circuits without I/O unless connected; any I/O
    /// failure faults the link.
    pub fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Faulted => return Err(LinkError::Faulted),
            ConnectionState::Disconnected => return Err(LinkError::NotConnected),
        }
        let mut w = lock(&self.writer);
        let Some(t) = w.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        t.write(bytes).map_err(|e| {
            self.mark_faulted("write", &e);
            LinkError::Io(e.to_string())
        })
    }

    /// Wait up to `timeout` for one line. Returns the line trimmed, with
    /// invalid UTF-8 replaced. `None` on timeout or when not connected; a read
    /// error faults the link and also yields `None`.
    pub fn read_line(&self, timeout: Duration) -> Option<String> {
        let mut half = lock(&self.reader);
        let line = self.read_line_locked(&mut half, timeout);
        if line.is_none() && self.state() == ConnectionState::Disconnected {
            // close() could not take the half while we held it
            half.release();
        }
        line
    }

    fn read_line_locked(&self, half: &mut ReadHalf, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if self.state() != ConnectionState::Connected {
                return None;
            }
            if let Some(line) = half.take_line() {
                return Some(line);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = (deadline - now).min(READ_SLICE);
            let t = half.transport.as_mut()?;
            match t.read(&mut chunk, slice) {
                Ok(0) => {}
                Ok(n) => half.pending.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    self.mark_faulted("read", &e);
                    return None;
                }
            }
        }
    }

    /// Release both halves. Idempotent and safe while a read is in flight:
    /// the reader notices within one `READ_SLICE`.
    pub fn close(&self) {
        let was = std::mem::replace(&mut *lock(&self.state), ConnectionState::Disconnected);
        drop(lock(&self.writer).take());
        if let Some(mut half) = try_lock(&self.reader) {
            half.release();
        }
        if was != ConnectionState::Disconnected {
            info!(port = %self.name, "link closed");
        }
    }

    /// Manual reconnect with the original opener. Clears `Faulted`.
    pub fn reopen(&self) -> Result<(), ConnectError> {
        let pair = (self.opener)().map_err(|e| {
            warn!(port = %self.name, error = %e, "reconnect failed");
            ConnectError {
                port: self.name.clone(),
                reason: e.to_string(),
            }
        })?;
        {
            let mut half = lock(&self.reader);
            half.release();
            half.transport = Some(pair.reader);
        }
        *lock(&self.writer) = Some(pair.writer);
        *lock(&self.state) = ConnectionState::Connected;
        info!(port = %self.name, "reconnected");
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
        debug!(port = %self.name, "link dropped");
    }
}

fn try_lock<T>(m: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match m.try_lock() {
        Ok(g) => Some(g),
        Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

//! In-memory servo that speaks the line protocol.
//!
//! The device side parses `START,<angle>,<speed>`, `STOP` and `RESET,<angle>`,
//! walks its shaft toward the commanded angle one tick at a time, reports
//! `Angle:<deg>` per tick and `TARGET_REACHED` on arrival. Failure hooks let
//! tests unplug the device or make the next write fail.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use servo_traits::{BoxError, Transport, TransportPair};
use tracing::trace;

use crate::error::HwError;

/// Time between feedback reports while moving.
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct SimState {
    angle: f64,
    target: f64,
    step_deg: f64,
    moving: bool,
    outbox: VecDeque<u8>,
    received: Vec<String>,
    partial: String,
    unplugged: bool,
    fail_next_write: bool,
}

impl SimState {
    fn handle_command(&mut self, line: &str) {
        self.received.push(line.to_string());
        let mut parts = line.split(',');
        match parts.next() {
            Some("START") => {
                let angle = parts.next().and_then(|a| a.trim().parse::<f64>().ok());
                let speed = parts.next().and_then(|s| s.trim().parse::<u8>().ok());
                if let (Some(angle), Some(speed)) = (angle, speed) {
                    self.target = angle.clamp(0.0, 180.0);
                    // speed 1 is fastest, 5 slowest
                    self.step_deg = f64::from(6u8.saturating_sub(speed.clamp(1, 5)));
                    self.moving = true;
                }
            }
            Some("STOP") => self.moving = false,
            Some("RESET") => {
                if let Some(angle) = parts.next().and_then(|a| a.trim().parse::<f64>().ok()) {
                    self.target = angle.clamp(0.0, 180.0);
                    self.step_deg = 5.0;
                    self.moving = true;
                }
            }
            _ => {}
        }
    }

    fn tick(&mut self) {
        if !self.moving {
            return;
        }
        let delta = self.target - self.angle;
        if delta.abs() <= self.step_deg {
            self.angle = self.target;
        } else {
            self.angle += self.step_deg.copysign(delta);
        }
        self.outbox
            .extend(format!("Angle:{:.2}\n", self.angle).into_bytes());
        if self.angle == self.target {
            self.moving = false;
            self.outbox.extend(b"TARGET_REACHED\n");
        }
    }

    fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

/// Handle to a simulated servo; clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedServo {
    state: Arc<Mutex<SimState>>,
    tick: Duration,
}

impl Default for SimulatedServo {
    fn default() -> Self {
        Self::new(90.0)
    }
}

impl SimulatedServo {
    pub fn new(initial_angle: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                angle: initial_angle,
                target: initial_angle,
                step_deg: 5.0,
                moving: false,
                outbox: VecDeque::new(),
                received: Vec::new(),
                partial: String::new(),
                unplugged: false,
                fail_next_write: false,
            })),
            tick: DEFAULT_TICK,
        }
    }

    /// Override the feedback period.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not wedge the device for others.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Open the device; fails while unplugged.
    pub fn open(&self) -> Result<TransportPair, HwError> {
        if self.lock().unplugged {
            return Err(HwError::Disconnected);
        }
        Ok(TransportPair::new(
            SimHalf {
                device: self.clone(),
            },
            SimHalf {
                device: self.clone(),
            },
        ))
    }

    /// Current shaft angle.
    pub fn angle(&self) -> f64 {
        self.lock().angle
    }

    /// Command lines received so far, without terminators.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Queue a raw line for the host to read, as if the firmware printed it.
    pub fn inject_line(&self, line: &str) {
        let mut st = self.lock();
        st.outbox.extend(line.as_bytes());
        st.outbox.push_back(b'\n');
    }

    /// Queue raw bytes, terminator not implied.
    pub fn inject_bytes(&self, bytes: &[u8]) {
        self.lock().outbox.extend(bytes);
    }

    /// Make every read and write fail until `replug`.
    pub fn unplug(&self) {
        self.lock().unplugged = true;
    }

    pub fn replug(&self) {
        self.lock().unplugged = false;
    }

    /// Fail exactly the next write.
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }
}

/// Read or write half of an open simulated device.
struct SimHalf {
    device: SimulatedServo,
}

impl Transport for SimHalf {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, BoxError> {
        {
            let mut st = self.device.lock();
            if st.unplugged {
                return Err(Box::new(HwError::Disconnected));
            }
            if !st.outbox.is_empty() {
                return Ok(st.drain_into(buf));
            }
            if !st.moving {
                drop(st);
                std::thread::sleep(timeout);
                let mut st = self.device.lock();
                return Ok(st.drain_into(buf));
            }
        }
        std::thread::sleep(self.device.tick.min(timeout));
        let mut st = self.device.lock();
        if st.unplugged {
            return Err(Box::new(HwError::Disconnected));
        }
        st.tick();
        Ok(st.drain_into(buf))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut st = self.device.lock();
        if st.unplugged {
            return Err(Box::new(HwError::Disconnected));
        }
        if std::mem::take(&mut st.fail_next_write) {
            return Err(Box::new(HwError::WriteTimeout));
        }
        st.partial.push_str(&String::from_utf8_lossy(bytes));
        while let Some(pos) = st.partial.find('\n') {
            let line: String = st.partial.drain(..=pos).collect();
            let line = line.trim();
            trace!(line, "sim servo received");
            if !line.is_empty() {
                st.handle_command(line);
            }
        }
        Ok(())
    }
}

//! Serial transport backed by the `serialport` crate.
//!
//! A port is opened once and split with `try_clone` into a read half and a
//! write half, each carrying its own timeout.
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use servo_traits::{BoxError, Transport, TransportPair};
use tracing::{debug, info};

use crate::error::{HwError, Result};

/// Shortest timeout handed to the OS; zero would turn reads non-blocking.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// One half of an open serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    /// Open `path` at `baud` (8N1, no flow control) and split it into halves.
    pub fn open_pair(
        path: &str,
        baud: u32,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<TransportPair> {
        let write_timeout = write_timeout.max(MIN_TIMEOUT);
        let writer = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(write_timeout)
            .open()?;
        let mut reader = writer.try_clone()?;
        let read_timeout = read_timeout.max(MIN_TIMEOUT);
        reader.set_timeout(read_timeout)?;

        info!(port = path, baud, "serial port opened");
        Ok(TransportPair::new(
            SerialTransport {
                port: reader,
                timeout: read_timeout,
            },
            SerialTransport {
                port: writer,
                timeout: write_timeout,
            },
        ))
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let timeout = timeout.max(MIN_TIMEOUT);
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, BoxError> {
        self.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let res = self.port.write_all(bytes).and_then(|()| self.port.flush());
        match res {
            Ok(()) => {
                debug!(len = bytes.len(), "serial write");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(Box::new(HwError::WriteTimeout)),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}

/// A serial port visible to the OS, for the port picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub name: String,
    pub description: String,
}

/// Enumerate serial ports, sorted by name.
pub fn list_ports() -> Result<Vec<PortEntry>> {
    let mut out: Vec<PortEntry> = serialport::available_ports()?
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(info) => {
                    let product = info.product.unwrap_or_else(|| "USB".to_string());
                    format!("{product} ({:04x}:{:04x})", info.vid, info.pid)
                }
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::Unknown => String::new(),
            };
            PortEntry {
                name: p.port_name,
                description,
            }
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

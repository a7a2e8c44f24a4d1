pub mod clock;

pub use clock::{Clock, SystemClock};

use std::time::Duration;

/// Error type crossing the transport boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One half of a byte-oriented serial connection.
///
/// A connection is opened as a read half and a write half so the ingestion
/// thread and the command path never contend for the same handle.
pub trait Transport: Send {
    /// Read whatever bytes arrive within `timeout`. `Ok(0)` means nothing
    /// arrived before the timeout elapsed.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, BoxError>;

    /// Write all of `bytes`, blocking up to the half's write timeout.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, BoxError> {
        (**self).read(buf, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write(bytes)
    }
}

/// A freshly opened connection, split into its read and write halves.
pub struct TransportPair {
    pub reader: Box<dyn Transport>,
    pub writer: Box<dyn Transport>,
}

impl TransportPair {
    pub fn new(reader: impl Transport + 'static, writer: impl Transport + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

//! Test and helper mocks for servo_core

use std::time::Duration;

use servo_traits::{BoxError, Transport, TransportPair};

/// A transport whose every read and write fails; useful to drive a link
/// straight into `Faulted`.
pub struct DeadTransport;

impl Transport for DeadTransport {
    fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<usize, BoxError> {
        Err(Box::new(std::io::Error::other("dead transport")))
    }

    fn write(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("dead transport")))
    }
}

impl DeadTransport {
    pub fn pair() -> TransportPair {
        TransportPair::new(DeadTransport, DeadTransport)
    }
}

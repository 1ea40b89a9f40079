//! Serial link to the range finder
//!
//! Line settings: 9600 baud, 8N1, 1 s per-read timeout. The sensor streams
//! ASCII frames (`R1234\r`) continuously, so there is nothing to write.
//!
//! A [`Connector`] opens a fresh [`ByteSource`] for every acquisition; the
//! source closes the device when dropped.

use std::io::{self, ErrorKind, Read};
use std::time::Duration;
use tokio_serial::{DataBits, Parity, SerialPort, StopBits};
use tracing::trace;

/// A byte stream that can report how much is buffered
pub trait ByteSource {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `max` bytes. May return fewer, or none if the read timed out.
    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>>;
}

/// Opens a [`ByteSource`] on demand
pub trait Connector {
    type Source: ByteSource;

    fn open(&mut self) -> io::Result<Self::Source>;

    /// Human-readable name of the endpoint, for logs
    fn endpoint(&self) -> &str;
}

/// Connector for a real serial device
#[derive(Debug, Clone)]
pub struct SerialConnector {
    device: String,
    baud: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(device: &str, baud: u32, read_timeout: Duration) -> Self {
        Self { device: device.to_string(), baud, read_timeout }
    }
}

impl Connector for SerialConnector {
    type Source = SerialSource;

    fn open(&mut self) -> io::Result<SerialSource> {
        let port = tokio_serial::new(&self.device, self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.read_timeout)
            .open()
            .map_err(io::Error::from)?;

        trace!(device = %self.device, baud = %self.baud, "serial_port_opened");
        Ok(SerialSource { port, device: self.device.clone() })
    }

    fn endpoint(&self) -> &str {
        &self.device
    }
}

pub struct SerialSource {
    port: Box<dyn SerialPort>,
    device: String,
}

impl ByteSource for SerialSource {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }

    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        trace!(device = %self.device, "serial_port_closed");
    }
}

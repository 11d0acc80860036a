/*!
Byte transports for the motor controller link.
*/

use anyhow::{Context, Result as AnyResult};
use laser_core::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Bidirectional byte stream to the motor controller
pub trait Transport: Send {
    /// Read available bytes into `buffer`; 0 means nothing arrived in time
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// UART link, 8N1 without flow control
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> AnyResult<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .with_context(|| format!("Failed to open serial port {}", path))?;

        info!("🔌 Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

#[derive(Default)]
struct LoopbackInner {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

/// In-memory link; clones share the same buffers.
///
/// Stands in for the motor controller in the simulator and in tests.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<LoopbackInner>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackInner> {
        // Buffers stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue bytes as if the peer had sent them
    pub fn inject(&self, data: &[u8]) {
        self.lock().inbound.extend(data);
    }

    /// Take everything written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().outbound)
    }
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        let n = inner.inbound.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.lock().outbound.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_read_partial() {
        let mut transport = LoopbackTransport::new();
        transport.inject(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_loopback_clones_share_buffers() {
        let peer = LoopbackTransport::new();
        let mut link = peer.clone();

        link.write_all(b"abc").unwrap();
        link.write_all(b"de").unwrap();
        assert_eq!(peer.take_written(), b"abcde".to_vec());
        assert!(peer.take_written().is_empty());
    }
}

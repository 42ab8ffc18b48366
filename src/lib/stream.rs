use anyhow::Result;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Minimal view of the serial line the transport needs.
pub trait ByteStream {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;
    /// Number of received bytes waiting in the input buffer. Never blocks.
    fn bytes_available(&mut self) -> Result<usize>;
    /// Reads up to `count` buffered bytes.
    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>>;
}

impl ByteStream for Box<dyn SerialPort> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        self.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        let len = self.read(&mut buffer)?;
        buffer.truncate(len);
        Ok(buffer)
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

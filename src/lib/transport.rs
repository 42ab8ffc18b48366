use anyhow::Result;
use log::debug;
use std::time::Duration;

use crate::diag::{Diagnosed, Warning};
use crate::stream::{ByteStream, Clock, SystemClock};

pub const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// How long `read` waits for the device to produce a complete reply.
    pub timeout: Duration,
    /// Cadence of the "bytes available" samples.
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Bytes gathered by one read cycle. May hold zero or more CR LF separated lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        RawFrame(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).trim().to_string()
    }

    pub fn segments(&self) -> Vec<String> {
        self.text()
            .split(LINE_TERMINATOR)
            .map(|s| s.trim().to_string())
            .collect()
    }
}

/// Echo-then-terminate command protocol over a raw byte stream.
///
/// The transport never retries; a read that sees no complete reply returns an
/// empty frame with [`Warning::TimedOut`] and the caller decides what to do.
pub struct Transport<S, C = SystemClock> {
    stream: S,
    clock: C,
    config: TransportConfig,
}

impl<S: ByteStream> Transport<S, SystemClock> {
    pub fn new(stream: S, config: TransportConfig) -> Self {
        Self::with_clock(stream, config, SystemClock)
    }
}

impl<S: ByteStream, C: Clock> Transport<S, C> {
    pub fn with_clock(stream: S, config: TransportConfig, clock: C) -> Self {
        Transport {
            stream,
            clock,
            config,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Sends `command` one character at a time, consuming the echo of each
    /// character before the next one goes out, then sends CR LF on its own.
    pub fn write(&mut self, command: &str) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();
        let mut buf = [0u8; 4];

        debug!("write {:?}", command);
        for c in command.chars() {
            self.stream.write_bytes(c.encode_utf8(&mut buf).as_bytes())?;
            let echo = self.read()?;
            debug!("echo {:?}", echo.value.text());
            warnings.extend(echo.warnings);
        }
        self.stream.write_bytes(LINE_TERMINATOR.as_bytes())?;

        Ok(warnings)
    }

    /// Waits until the input buffer holds a nonzero byte count that stays the
    /// same across two consecutive samples, then takes all of it.
    ///
    /// A timeout too large to represent as an instant never expires.
    pub fn read(&mut self) -> Result<Diagnosed<RawFrame>> {
        let stop = self.clock.now().checked_add(self.config.timeout);
        let mut last_count = 0;

        while stop.map_or(true, |stop| self.clock.now() < stop) {
            let count = self.stream.bytes_available()?;
            if count > 0 && count == last_count {
                let bytes = self.stream.read_bytes(count)?;
                debug!("recv {:?}", String::from_utf8_lossy(&bytes));
                return Ok(Diagnosed::clean(RawFrame::new(bytes)));
            }
            last_count = count;
            self.clock.sleep(self.config.poll_interval);
        }

        Ok(Diagnosed::new(
            RawFrame::default(),
            vec![Warning::TimedOut.emit()],
        ))
    }

    /// Drains whatever is buffered right now. Never waits, never warns.
    pub fn flush(&mut self) -> Result<()> {
        let count = self.stream.bytes_available()?;
        if count > 0 {
            let bytes = self.stream.read_bytes(count)?;
            debug!("flush {:?}", String::from_utf8_lossy(&bytes));
        }
        Ok(())
    }
}

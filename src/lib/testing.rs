use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::stream::{ByteStream, Clock};

/// Clock that only moves when slept on.
pub struct FakeClock {
    start: Instant,
    elapsed: Duration,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            start: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed
    }

    fn sleep(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

/// Scripted serial line.
///
/// Staged chunks become visible once `bytes_available` has been sampled the
/// given number of times. With `echo` on, every character written is echoed
/// back; a CR LF looks up a reply for the line typed since the last one.
#[derive(Default)]
pub struct FakeStream {
    samples: usize,
    staged: Vec<(usize, Vec<u8>)>,
    buffer: VecDeque<u8>,
    echo: bool,
    line: String,
    replies: HashMap<String, VecDeque<String>>,
    writes: Vec<String>,
    consumed: Vec<u8>,
}

impl FakeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, sample: usize, data: &str) -> Self {
        self.staged.push((sample, data.as_bytes().to_vec()));
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Queues `reply` for the next time `line` is entered.
    pub fn reply(mut self, line: &str, reply: &str) -> Self {
        self.replies
            .entry(line.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        let all: String = self.writes.concat();
        let mut lines: Vec<String> = all.split("\r\n").map(|s| s.to_string()).collect();
        lines.pop();
        lines
    }

    pub fn consumed(&self) -> String {
        String::from_utf8_lossy(&self.consumed).to_string()
    }
}

impl ByteStream for FakeStream {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data).to_string();
        self.writes.push(text.clone());

        if text == "\r\n" {
            let line = std::mem::take(&mut self.line);
            if let Some(reply) = self.replies.get_mut(&line).and_then(|r| r.pop_front()) {
                self.buffer.extend(reply.bytes());
            }
        } else {
            self.line.push_str(&text);
            if self.echo {
                self.buffer.extend(data.iter());
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let samples = self.samples;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.staged)
            .into_iter()
            .partition(|(at, _)| *at <= samples);
        self.staged = later;
        for (_, data) in due {
            self.buffer.extend(data);
        }
        self.samples += 1;
        Ok(self.buffer.len())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let count = count.min(self.buffer.len());
        let bytes: Vec<u8> = self.buffer.drain(..count).collect();
        self.consumed.extend(&bytes);
        Ok(bytes)
    }
}

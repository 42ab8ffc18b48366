use anyhow::Result;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::commands;
use crate::diag::{Diagnosed, Warning};
use crate::parser;
use crate::reading::Reading;
use crate::sink::Sink;
use crate::stream::{ByteStream, Clock, SystemClock};
use crate::transport::{RawFrame, Transport};

/// Where a session gets its data from.
pub trait FrameSource {
    /// Tells the instrument to emit a data line every `interval_secs` seconds.
    fn start_output(&mut self, interval_secs: u32) -> Result<Vec<Warning>>;
    /// Collects whatever the instrument sent since the last call.
    fn next_frame(&mut self) -> Result<Diagnosed<RawFrame>>;
}

impl<S: ByteStream, C: Clock> FrameSource for Transport<S, C> {
    fn start_output(&mut self, interval_secs: u32) -> Result<Vec<Warning>> {
        commands::set_output_interval(self, interval_secs)
    }

    fn next_frame(&mut self) -> Result<Diagnosed<RawFrame>> {
        self.read()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogError {
    #[error("unable to get data from instrument")]
    NoResponse,
    #[error("no data received for {0} ticks in a row")]
    DataStarved(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Cancelled,
    NoResponse,
    DataStarved,
}

impl StopReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StopReason::NoResponse | StopReason::DataStarved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Output interval configured, waiting for the first reading.
    Priming,
    Collecting,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Tick period; also sent to the instrument in whole seconds.
    pub interval: Duration,
    /// Total time to collect for once the first reading has arrived.
    pub total: Option<Duration>,
    /// Consecutive ticks without a reading before the session gives up.
    pub max_empty_ticks: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            interval: Duration::from_secs(10),
            total: None,
            max_empty_ticks: 3,
        }
    }
}

/// One logging run, from priming to stopped.
///
/// The history only ever grows. A tick that yields readings resets the
/// empty-tick counter, any other tick increments it.
pub struct LogSession<F, K, C = SystemClock> {
    source: F,
    sink: K,
    clock: C,
    config: LogConfig,
    state: SessionState,
    history: Vec<Reading>,
    empty_ticks: u32,
    output_started: bool,
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<F: FrameSource, K: Sink> LogSession<F, K, SystemClock> {
    pub fn new(source: F, sink: K, config: LogConfig) -> Self {
        Self::with_clock(source, sink, config, SystemClock)
    }
}

impl<F: FrameSource, K: Sink, C: Clock> LogSession<F, K, C> {
    pub fn with_clock(source: F, sink: K, config: LogConfig, clock: C) -> Self {
        LogSession {
            source,
            sink,
            clock,
            config,
            state: SessionState::Priming,
            history: Vec::new(),
            empty_ticks: 0,
            output_started: false,
            deadline: None,
            cancel: None,
        }
    }

    /// The session stops at the next tick boundary once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Reading] {
        &self.history
    }

    pub fn empty_ticks(&self) -> u32 {
        self.empty_ticks
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Ticks until the session stops. Fatal stops come back as [`LogError`].
    pub fn run(&mut self) -> Result<StopReason> {
        loop {
            if let SessionState::Stopped(reason) = self.tick()? {
                return Ok(reason);
            }
        }
    }

    pub fn tick(&mut self) -> Result<SessionState> {
        if let SessionState::Stopped(_) = self.state {
            return Ok(self.state);
        }
        if self.is_cancelled() {
            return Ok(self.stop(StopReason::Cancelled));
        }

        if !self.output_started {
            self.start_output()?;
        }

        self.clock.sleep(self.config.interval);
        let frame = self.source.next_frame()?;
        let new = collect_readings(&frame.value);

        if new.is_empty() {
            self.empty_ticks += 1;
            debug!("empty tick {}/{}", self.empty_ticks, self.config.max_empty_ticks);

            if self.empty_ticks >= self.config.max_empty_ticks {
                return Err(match self.state {
                    SessionState::Priming => {
                        self.stop(StopReason::NoResponse);
                        LogError::NoResponse
                    }
                    _ => {
                        self.stop(StopReason::DataStarved);
                        LogError::DataStarved(self.empty_ticks)
                    }
                }
                .into());
            }
        } else {
            self.empty_ticks = 0;
            let start = self.history.len();
            self.history.extend(new);

            if self.state == SessionState::Priming {
                self.sink.initialize(&self.history)?;
                self.state = SessionState::Collecting;
                // a total past the end of representable time never expires
                self.deadline = self
                    .config
                    .total
                    .and_then(|total| self.clock.now().checked_add(total));
                info!("logging started");
            } else {
                self.sink.append(&self.history[start..], &self.history)?;
            }
        }

        if self.deadline.map_or(false, |deadline| self.clock.now() >= deadline) {
            return Ok(self.stop(StopReason::Deadline));
        }
        if self.is_cancelled() {
            return Ok(self.stop(StopReason::Cancelled));
        }
        Ok(self.state)
    }

    fn start_output(&mut self) -> Result<()> {
        let interval = self.config.interval;
        if interval.subsec_nanos() != 0 {
            warn!("interval should be a whole number of seconds, using {}", interval.as_secs());
        }
        let secs = u32::try_from(interval.as_secs()).unwrap_or(u32::MAX);

        self.source.start_output(secs)?;
        self.output_started = true;
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn stop(&mut self, reason: StopReason) -> SessionState {
        if reason.is_fatal() {
            warn!("logging stopped: {:?} after {} readings", reason, self.history.len());
        } else {
            info!("logging stopped: {:?} after {} readings", reason, self.history.len());
        }
        self.state = SessionState::Stopped(reason);
        self.state
    }
}

/// Parses every line of a frame, keeping the ones that hold data.
fn collect_readings(frame: &RawFrame) -> Vec<Reading> {
    frame
        .segments()
        .iter()
        .filter_map(|segment| parser::parse(segment).ok())
        .map(|reading| {
            info!("{}", reading.value);
            reading.value
        })
        .collect()
}

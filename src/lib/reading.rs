use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Status token reported while the mirror servo is locked onto the dewpoint.
pub const LOCKED_STATUS: &str = "SERVOLOCK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    /// Parsed from the instrument's own output.
    Device,
    /// Local wall-clock time substituted at parse time.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Token(String),
    Unknown,
}

impl Status {
    pub fn is_locked(&self) -> bool {
        matches!(self, Status::Token(token) if token == LOCKED_STATUS)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Token(token) => token,
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// One parsed measurement line.
///
/// Names and values are parallel sequences of equal length, in order of
/// appearance. Duplicated names are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    timestamp: NaiveDateTime,
    timestamp_source: TimestampSource,
    names: Vec<String>,
    values: Vec<f64>,
    status: Status,
}

impl Reading {
    pub fn new(
        timestamp: NaiveDateTime,
        timestamp_source: TimestampSource,
        measurements: Vec<(String, f64)>,
        status: Status,
    ) -> Self {
        let (names, values) = measurements.into_iter().unzip();
        Reading {
            timestamp,
            timestamp_source,
            names,
            values,
            status,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn timestamp_source(&self) -> TimestampSource {
        self.timestamp_source
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn measurements(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(|n| n.as_str())
            .zip(self.values.iter().cloned())
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}  {}  {}",
            self.timestamp.format("%m/%d/%Y %H:%M:%S"),
            self.measurements()
                .map(|(name, value)| format!("{} = {}", name, value))
                .join("  "),
            self.status
        )
    }
}

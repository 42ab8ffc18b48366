use log::warn;
use thiserror::Error;

/// Non-fatal conditions reported next to a result instead of aborting it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("read attempt timed out")]
    TimedOut,
    #[error("text has multiple lines, using the first recognized data line")]
    MultipleSegments,
    #[error("unable to identify timestamp, using local time")]
    SynthesizedTimestamp,
    #[error("unable to identify status of measurement")]
    MissingStatus,
    #[error("status is {0}, data may be inaccurate")]
    Unlocked(String),
    #[error("{0} may not have been set properly")]
    SettingUnconfirmed(&'static str),
    #[error("{setting} was set to {applied} instead of {requested}")]
    SettingMismatch {
        setting: &'static str,
        requested: u32,
        applied: u32,
    },
}

impl Warning {
    /// Logs the warning and hands it back, for `warnings.push(w.emit())`.
    pub fn emit(self) -> Self {
        warn!("{}", self);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosed<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Diagnosed<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Diagnosed { value, warnings }
    }

    pub fn clean(value: T) -> Self {
        Diagnosed {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn has(&self, warning: &Warning) -> bool {
        self.warnings.contains(warning)
    }
}

use anyhow::{Context, Result};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reading::Reading;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("cannot start a log without readings")]
    EmptyHistory,
    #[error("{0:?} does not point to a valid directory")]
    NoDirectory(PathBuf),
}

/// Destination for logged readings.
///
/// `initialize` receives the whole history once the first readings exist.
/// Every later `append` receives the readings new in this tick along with the
/// full history they were appended to. Only complete readings are handed out.
pub trait Sink {
    fn initialize(&mut self, history: &[Reading]) -> Result<()>;
    fn append(&mut self, new: &[Reading], history: &[Reading]) -> Result<()>;
}

impl Sink for Vec<Box<dyn Sink>> {
    fn initialize(&mut self, history: &[Reading]) -> Result<()> {
        self.iter_mut().try_for_each(|sink| sink.initialize(history))
    }

    fn append(&mut self, new: &[Reading], history: &[Reading]) -> Result<()> {
        self.iter_mut().try_for_each(|sink| sink.append(new, history))
    }
}

/// Derives `<base>.csv` and `<base>.bin` from a base file name.
pub fn sink_paths(base: &Path) -> Result<(PathBuf, PathBuf)> {
    if let Some(dir) = base.parent() {
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            return Err(SinkError::NoDirectory(dir.to_path_buf()).into());
        }
    }
    Ok((base.with_extension("csv"), base.with_extension("bin")))
}

/// Comma separated text log, one row per reading.
///
/// Fields after the first carry a leading space, so rows read
/// `08/15/2022 14:30:05, -40.25, SERVOLOCK`.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CsvSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn writer(file: File) -> csv::Writer<File> {
        // readings may differ in measurement count from the header
        csv::WriterBuilder::new().flexible(true).from_writer(file)
    }

    fn write_rows(writer: &mut csv::Writer<File>, readings: &[Reading]) -> Result<()> {
        for reading in readings {
            writer.write_record(row(reading))?;
        }
        Ok(())
    }
}

impl Sink for CsvSink {
    fn initialize(&mut self, history: &[Reading]) -> Result<()> {
        let first = history.first().ok_or(SinkError::EmptyHistory)?;
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut writer = Self::writer(file);

        writer.write_record(header(first))?;
        Self::write_rows(&mut writer, history)?;
        writer.flush()?;

        debug!("csv started: {} rows", history.len());
        Ok(())
    }

    fn append(&mut self, new: &[Reading], _history: &[Reading]) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut writer = Self::writer(file);

        Self::write_rows(&mut writer, new)?;
        writer.flush()?;
        Ok(())
    }
}

fn header(reading: &Reading) -> Vec<String> {
    std::iter::once("Time".to_string())
        .chain(reading.names().iter().map(|name| format!(" {}", name)))
        .chain(std::iter::once(" Status".to_string()))
        .collect()
}

fn row(reading: &Reading) -> Vec<String> {
    std::iter::once(reading.timestamp().format("%m/%d/%Y %H:%M:%S").to_string())
        .chain(reading.values().iter().map(|&v| format!(" {}", format_general(v))))
        .chain(std::iter::once(format!(" {}", reading.status())))
        .collect()
}

/// Renders a value the way C's `%g` does: six significant digits, no trailing
/// zeros, exponent form outside [1e-4, 1e6).
pub fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // exponent after rounding to the target precision
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        strip_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Binary snapshot of the whole history, rewritten on every update.
pub struct SnapshotSink {
    path: PathBuf,
}

impl SnapshotSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SnapshotSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Writes next to the target and renames over it, so readers see either the
    /// old or the new snapshot.
    fn replace(&self, history: &[Reading]) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        let mut out = BufWriter::new(file);
        bincode::serialize_into(&mut out, history)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("snapshot written: {} readings", history.len());
        Ok(())
    }
}

impl Sink for SnapshotSink {
    fn initialize(&mut self, history: &[Reading]) -> Result<()> {
        self.replace(history)
    }

    fn append(&mut self, _new: &[Reading], history: &[Reading]) -> Result<()> {
        self.replace(history)
    }
}

pub fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<Reading>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

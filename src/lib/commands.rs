use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use thiserror::Error;

use crate::diag::{Diagnosed, Warning};
use crate::parser;
use crate::reading::Reading;
use crate::stream::{ByteStream, Clock};
use crate::transport::Transport;

pub const MAX_AVERAGE: u32 = 16;

const STATUS: &str = "ST";
const AVERAGE: &str = "AV";
const OUTPUT_INTERVAL: &str = "O";
const POLL: &str = "P";
const CONTINUE_PROMPT: &str = "Press ENTER to continue.....";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("average count should be between 1 and 16, got {0}")]
    AverageOutOfRange(u32),
    #[error("output interval should be greater than zero")]
    IntervalOutOfRange,
}

lazy_static! {
    static ref AVERAGE_RE: Regex =
        Regex::new(r"Number of data points to average = (\d+)").unwrap();
    static ref INTERVAL_RE: Regex = Regex::new(r"The new serial interval is (\d+)").unwrap();
}

/// Fetches the system status report.
pub fn get_status<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
) -> Result<Diagnosed<String>> {
    transport.flush()?;
    let mut warnings = transport.write(STATUS)?;
    let report = transport.read()?;
    warnings.extend(report.warnings);

    // leave the report page and swallow the poll output that follows
    warnings.extend(transport.write("")?);
    transport.read()?;
    transport.read()?;

    let text = report
        .value
        .text()
        .replace('\r', "")
        .replace(CONTINUE_PROMPT, "");
    Ok(Diagnosed::new(text.trim().to_string(), warnings))
}

/// Checks that the instrument answers a status query at all.
pub fn is_responsive<S: ByteStream, C: Clock>(transport: &mut Transport<S, C>) -> Result<bool> {
    if get_status(transport)?.value.is_empty() {
        warn!("instrument did not respond to a status query");
        return Ok(false);
    }
    Ok(true)
}

/// Sets how many samples the instrument averages into each reading.
pub fn set_average<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
    count: u32,
) -> Result<Vec<Warning>> {
    if !(1..=MAX_AVERAGE).contains(&count) {
        return Err(CommandError::AverageOutOfRange(count).into());
    }

    let reply = set_value(transport, AVERAGE, count)?;
    Ok(confirm(reply, &AVERAGE_RE, "average", count))
}

/// Sets the period, in seconds, of the instrument's unsolicited data output.
pub fn set_output_interval<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
    seconds: u32,
) -> Result<Vec<Warning>> {
    if seconds < 1 {
        return Err(CommandError::IntervalOutOfRange.into());
    }

    let reply = set_value(transport, OUTPUT_INTERVAL, seconds)?;
    Ok(confirm(reply, &INTERVAL_RE, "interval", seconds))
}

/// Asks for the data currently on screen and returns it unparsed.
pub fn poll_immediate<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
) -> Result<Diagnosed<String>> {
    transport.flush()?;
    let mut warnings = transport.write(POLL)?;
    let data = transport.read()?;
    warnings.extend(data.warnings);
    transport.read()?;

    Ok(Diagnosed::new(data.value.text(), warnings))
}

pub fn read_immediate<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
) -> Result<Diagnosed<Reading>> {
    let raw = poll_immediate(transport)?;
    let mut reading = parser::parse(&raw.value)?;

    let mut warnings = raw.warnings;
    warnings.append(&mut reading.warnings);
    Ok(Diagnosed::new(reading.value, warnings))
}

fn set_value<S: ByteStream, C: Clock>(
    transport: &mut Transport<S, C>,
    command: &str,
    value: u32,
) -> Result<Diagnosed<String>> {
    transport.flush()?;
    let mut warnings = transport.write(command)?;
    warnings.extend(transport.read()?.warnings);
    warnings.extend(transport.write(&value.to_string())?);
    let reply = transport.read()?;
    warnings.extend(reply.warnings);
    transport.read()?;

    debug!("{} {} -> {:?}", command, value, reply.value.text());
    Ok(Diagnosed::new(reply.value.text(), warnings))
}

fn confirm(
    reply: Diagnosed<String>,
    re: &Regex,
    setting: &'static str,
    requested: u32,
) -> Vec<Warning> {
    let mut warnings = reply.warnings;

    match re
        .captures(&reply.value)
        .and_then(|c| c[1].parse::<u32>().ok())
    {
        None => warnings.push(Warning::SettingUnconfirmed(setting).emit()),
        Some(applied) if applied != requested => warnings.push(
            Warning::SettingMismatch {
                setting,
                requested,
                applied,
            }
            .emit(),
        ),
        Some(_) => (),
    }
    warnings
}

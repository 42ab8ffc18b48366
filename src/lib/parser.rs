use chrono::{Local, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::diag::{Diagnosed, Warning};
use crate::reading::{Reading, Status, TimestampSource};
use crate::transport::LINE_TERMINATOR;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0:?} does not appear to contain any data")]
    NoData(String),
}

lazy_static! {
    static ref MEASUREMENT_RE: Regex =
        Regex::new(r"([A-Z]+)\s*=\s*([-+]?(?:\d+\.?\d*|\.\d+))").unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(concat!(
        r"\b(?:(\d\d)/(\d\d)/(\d\d)|(\d\d)(\d\d)(\d\d))",
        r"\s+",
        r"(?:(\d\d):(\d\d):(\d\d)|(\d\d)(\d\d)(\d\d))\b"
    ))
    .unwrap();
    static ref STATUS_RE: Regex = Regex::new(r"([A-Z]+)\s*$").unwrap();
}

/// Parses one instrument line, substituting the local time when the line
/// carries no usable timestamp.
pub fn parse(text: &str) -> Result<Diagnosed<Reading>, ParseError> {
    parse_at(text, Local::now().naive_local())
}

/// Same as [`parse`] with the fallback time supplied by the caller.
pub fn parse_at(text: &str, now: NaiveDateTime) -> Result<Diagnosed<Reading>, ParseError> {
    let mut warnings = Vec::new();
    let segment = select_segment(text.trim(), &mut warnings)?;

    let measurements = find_measurements(segment);
    if measurements.is_empty() {
        return Err(ParseError::NoData(segment.to_string()));
    }

    let (timestamp, source) = match find_timestamp(segment) {
        Some(ts) => (ts, TimestampSource::Device),
        None => {
            warnings.push(Warning::SynthesizedTimestamp.emit());
            (now, TimestampSource::Local)
        }
    };

    let status = match STATUS_RE.captures(segment.trim_end()) {
        Some(c) => {
            let status = Status::Token(c[1].to_string());
            if !status.is_locked() {
                warnings.push(Warning::Unlocked(status.to_string()).emit());
            }
            status
        }
        None => {
            warnings.push(Warning::MissingStatus.emit());
            Status::Unknown
        }
    };

    Ok(Diagnosed::new(
        Reading::new(timestamp, source, measurements, status),
        warnings,
    ))
}

/// First line holding a measurement wins; later ones are dropped, not merged.
fn select_segment<'a>(
    text: &'a str,
    warnings: &mut Vec<Warning>,
) -> Result<&'a str, ParseError> {
    if !text.contains(LINE_TERMINATOR) {
        return Ok(text);
    }

    warnings.push(Warning::MultipleSegments.emit());
    text.split(LINE_TERMINATOR)
        .find(|segment| MEASUREMENT_RE.is_match(segment))
        .ok_or_else(|| ParseError::NoData(text.to_string()))
}

fn find_measurements(segment: &str) -> Vec<(String, f64)> {
    MEASUREMENT_RE
        .captures_iter(segment)
        .filter_map(|c| c[2].parse::<f64>().ok().map(|v| (c[1].to_string(), v)))
        .collect()
}

fn find_timestamp(segment: &str) -> Option<NaiveDateTime> {
    let c = TIMESTAMP_RE.captures(segment)?;

    let field = |with_sep: usize, without_sep: usize| -> Option<u32> {
        c.get(with_sep)
            .or_else(|| c.get(without_sep))
            .and_then(|m| m.as_str().parse().ok())
    };

    let month = field(1, 4)?;
    let day = field(2, 5)?;
    let year = field(3, 6)? as i32;
    let hour = field(7, 10)?;
    let minute = field(8, 11)?;
    let second = field(9, 12)?;

    // two-digit years pivot the way strftime's %y does
    let year = if year < 69 { 2000 + year } else { 1900 + year };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parse_locked_line() {
        let r = parse("08/15/22 14:30:05  DEWPT = -40.25  SERVOLOCK").unwrap();

        assert!(r.warnings.is_empty());
        assert_eq!(r.value.timestamp(), datetime(2022, 8, 15, 14, 30, 5));
        assert_eq!(r.value.timestamp_source(), TimestampSource::Device);
        assert_eq!(r.value.names(), ["DEWPT"]);
        assert_eq!(r.value.values(), [-40.25]);
        assert_eq!(r.value.status(), &Status::Token("SERVOLOCK".to_string()));
    }

    #[test]
    fn parse_several_measurements_in_order() {
        let r = parse_at(
            "08/15/22 14:30:05  DEWPT = -40.25  TEMP = 21.3  DEWPT = -40.5  SERVOLOCK",
            fallback(),
        )
        .unwrap()
        .value;

        assert_eq!(r.names(), ["DEWPT", "TEMP", "DEWPT"]);
        assert_eq!(r.values(), [-40.25, 21.3, -40.5]);
        assert_eq!(r.names().len(), r.values().len());
    }

    #[test]
    fn parse_compact_timestamp() {
        let r = parse_at("081522 143005 DEWPT=12 SERVOLOCK", fallback())
            .unwrap()
            .value;

        assert_eq!(r.timestamp(), datetime(2022, 8, 15, 14, 30, 5));
        assert_eq!(r.values(), [12.0]);
    }

    #[test]
    fn parse_last_century() {
        let r = parse_at("12/31/99 23:59:59 DEWPT = 1 SERVOLOCK", fallback())
            .unwrap()
            .value;

        assert_eq!(r.timestamp(), datetime(1999, 12, 31, 23, 59, 59));
    }

    #[test]
    fn parse_without_timestamp_uses_local_time() {
        let r = parse_at("DEWPT = 5.5  SERVOLOCK", fallback()).unwrap();

        assert_eq!(r.warnings, vec![Warning::SynthesizedTimestamp]);
        assert_eq!(r.value.timestamp(), fallback());
        assert_eq!(r.value.timestamp_source(), TimestampSource::Local);
    }

    #[test]
    fn parse_invalid_date_falls_back() {
        let r = parse_at("13/45/22 14:30:05 DEWPT = 5.5 SERVOLOCK", fallback()).unwrap();

        assert!(r.has(&Warning::SynthesizedTimestamp));
        assert_eq!(r.value.timestamp(), fallback());
    }

    #[test]
    fn parse_without_measurements_fails() {
        assert!(matches!(
            parse_at("08/15/22 14:30:05  SERVOLOCK", fallback()),
            Err(ParseError::NoData(_))
        ));
        assert!(matches!(parse_at("", fallback()), Err(ParseError::NoData(_))));
        assert!(matches!(
            parse_at("INPUT: P", fallback()),
            Err(ParseError::NoData(_))
        ));
    }

    #[test]
    fn parse_missing_status() {
        let r = parse_at("08/15/22 14:30:05  DEWPT = -40.25", fallback()).unwrap();

        assert_eq!(r.warnings, vec![Warning::MissingStatus]);
        assert_eq!(r.value.status(), &Status::Unknown);
    }

    #[test]
    fn parse_unlocked_status_still_returns_reading() {
        let r = parse_at("08/15/22 14:30:05  DEWPT = -40.25  BALANCE  ", fallback()).unwrap();

        assert_eq!(r.warnings, vec![Warning::Unlocked("BALANCE".to_string())]);
        assert_eq!(r.value.status(), &Status::Token("BALANCE".to_string()));
    }

    #[test]
    fn parse_picks_first_data_segment() {
        let text = "INPUT: P\r\n08/15/22 14:30:05  DEWPT = -40.25  SERVOLOCK";
        let r = parse_at(text, fallback()).unwrap();

        assert_eq!(r.warnings, vec![Warning::MultipleSegments]);
        assert_eq!(r.value.values(), [-40.25]);
    }

    #[test]
    fn parse_discards_later_data_segments() {
        let text = "DEWPT = 1.0 SERVOLOCK\r\nDEWPT = 2.0 SERVOLOCK";
        let r = parse_at(text, fallback()).unwrap();

        assert_eq!(r.value.values(), [1.0]);
    }

    #[test]
    fn parse_multi_segment_without_data_fails() {
        assert!(matches!(
            parse_at("INPUT: P\r\nPress ENTER to continue", fallback()),
            Err(ParseError::NoData(_))
        ));
    }

    #[test]
    fn parse_is_deterministic() {
        let text = "08/15/22 14:30:05  DEWPT = -40.25  TEMP = 3  SERVOLOCK";
        assert_eq!(parse(text), parse(text));
        assert_eq!(
            parse_at("DEWPT = 1", fallback()),
            parse_at("DEWPT = 1", fallback())
        );
    }
}

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Skip sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// UART device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// Reply timeout in seconds
    #[clap(long, short, default_value_t = 2.0)]
    pub timeout: f64,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Reply timeout as a duration; must be positive and representable.
    pub fn reply_timeout(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.timeout) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(anyhow!(
                "Timeout should be a positive number of seconds, got {}",
                self.timeout
            )),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the system status report
    Status,

    /// Set the number of samples averaged per reading (1-16)
    #[clap(visible_alias = "avg")]
    SetAverage { count: u32 },

    /// Set the serial output interval in seconds
    SetInterval { seconds: u32 },

    /// Read the data currently on screen
    Poll {
        /// Print the unparsed reply
        #[clap(long)]
        raw: bool,
    },

    /// Log readings to <BASE>.csv and <BASE>.bin
    Log {
        base: PathBuf,

        /// Seconds between readings
        #[clap(long, short, default_value_t = 10)]
        interval: u32,

        /// Stop after this many seconds of collection
        #[clap(long)]
        total: Option<u64>,

        /// Don't write the text log
        #[clap(long)]
        no_csv: bool,

        /// Don't write the binary snapshot
        #[clap(long)]
        no_snapshot: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_arguments() {
        let cli = Cli::parse_from([
            "dewmaster-tool",
            "-p",
            "/dev/ttyUSB0",
            "log",
            "run1",
            "-i",
            "5",
        ]);
        assert_eq!(cli.port, "/dev/ttyUSB0");
        match cli.command {
            Commands::Log {
                base,
                interval,
                total,
                no_csv,
                no_snapshot,
            } => {
                assert_eq!(base, PathBuf::from("run1"));
                assert_eq!(interval, 5);
                assert_eq!(total, None);
                assert!(!no_csv && !no_snapshot);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn timeout_must_be_a_positive_duration() {
        let timeout =
            |arg: &str| Cli::parse_from(["dewmaster-tool", arg, "status"]).reply_timeout();

        assert_eq!(
            timeout("--timeout=0.5").unwrap(),
            Duration::from_millis(500)
        );
        assert!(timeout("--timeout=1e300").is_err());
        assert!(timeout("--timeout=-1").is_err());
        assert!(timeout("--timeout=0").is_err());
        assert!(timeout("--timeout=NaN").is_err());
    }

    #[test]
    fn average_alias() {
        let cli = Cli::parse_from(["dewmaster-tool", "avg", "8"]);
        assert!(matches!(cli.command, Commands::SetAverage { count: 8 }));
        assert_eq!(cli.timeout, 2.0);
    }
}

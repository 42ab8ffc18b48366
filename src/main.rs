mod cli;

use std::io;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use lazy_static::lazy_static;
use log::error;

use dewmaster::commands;
use dewmaster::logger::{LogConfig, LogSession};
use dewmaster::port::{self, SerialPort};
use dewmaster::reading::Reading;
use dewmaster::sink::{self, CsvSink, Sink, SnapshotSink};
use dewmaster::transport::{Transport, TransportConfig};

use cli::{Cli, Commands};

type Port = Transport<Box<dyn SerialPort>>;

lazy_static! {
    static ref INTERRUPTED: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

enum OutputFormat {
    Plain,
    Json,
}

#[cfg(unix)]
fn install_interrupt_handler() -> Result<()> {
    use nix::sys::signal::{self, SigHandler, Signal};

    extern "C" fn on_signal(_: nix::libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    lazy_static::initialize(&INTERRUPTED);
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::signal(sig, SigHandler::Handler(on_signal)) }
            .with_context(|| format!("Failed to install {:?} handler", sig))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_interrupt_handler() -> Result<()> {
    Ok(())
}

fn reading_to_json(reading: &Reading) -> json::JsonValue {
    let mut obj = json::object! {
        time: reading.timestamp().format("%m/%d/%Y %H:%M:%S").to_string(),
        status: reading.status().as_str(),
    };
    for (name, value) in reading.measurements() {
        obj[name] = value.into();
    }
    obj
}

fn cmd_status(transport: &mut Port) -> Result<String> {
    commands::get_status(transport).map(|status| status.value)
}

fn cmd_set_average(transport: &mut Port, count: u32) -> Result<String> {
    commands::set_average(transport, count)
        .context("Failed to set average")
        .map(|_| String::new())
}

fn cmd_set_interval(transport: &mut Port, seconds: u32) -> Result<String> {
    commands::set_output_interval(transport, seconds)
        .context("Failed to set output interval")
        .map(|_| String::new())
}

fn cmd_poll(transport: &mut Port, raw: bool, fmt: OutputFormat) -> Result<String> {
    commands::is_responsive(transport)?;
    if raw {
        return commands::poll_immediate(transport).map(|data| data.value);
    }

    let reading = commands::read_immediate(transport)?.value;
    Ok(match fmt {
        OutputFormat::Plain => reading.to_string(),
        OutputFormat::Json => json::stringify(reading_to_json(&reading)),
    })
}

fn cmd_log(
    mut transport: Port,
    base: &Path,
    interval: u32,
    total: Option<u64>,
    csv: bool,
    snapshot: bool,
) -> Result<String> {
    let (csv_path, bin_path) = sink::sink_paths(base)?;

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if csv {
        sinks.push(Box::new(CsvSink::new(csv_path)));
    }
    if snapshot {
        sinks.push(Box::new(SnapshotSink::new(bin_path)));
    }
    if sinks.is_empty() {
        return Err(anyhow!("Nothing to log to"));
    }

    let config = LogConfig {
        interval: Duration::from_secs(interval.into()),
        total: total.map(Duration::from_secs),
        ..LogConfig::default()
    };

    commands::is_responsive(&mut transport)?;

    install_interrupt_handler()?;
    let mut session = LogSession::new(transport, sinks, config).with_cancel(INTERRUPTED.clone());
    let reason = session
        .run()
        .with_context(|| format!("Logging to {} failed", base.display()))?;

    Ok(format!(
        "{} readings logged, stopped: {:?}",
        session.history().len(),
        reason
    ))
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(
            Bash,
            &mut cli::Cli::command(),
            "dewmaster-tool",
            &mut io::stdout(),
        );

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let timeout = cli.reply_timeout()?;

    let port = port::open_port(&cli.port, timeout, cli.force)?;
    let mut transport = Transport::new(
        port,
        TransportConfig {
            timeout,
            ..TransportConfig::default()
        },
    );

    match cli.command {
        Commands::Status => cmd_status(&mut transport),
        Commands::SetAverage { count } => cmd_set_average(&mut transport, count),
        Commands::SetInterval { seconds } => cmd_set_interval(&mut transport, seconds),
        Commands::Poll { raw } => cmd_poll(&mut transport, raw, fmt),
        Commands::Log {
            base,
            interval,
            total,
            no_csv,
            no_snapshot,
        } => cmd_log(transport, &base, interval, total, !no_csv, !no_snapshot),
    }
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => (),
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

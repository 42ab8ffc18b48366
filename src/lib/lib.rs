//! Driver for the Edgetech DewMaster chilled-mirror hygrometer.
//!
//! The instrument talks over a terminal-style serial interface: every typed
//! character is echoed back and a command only runs once CR LF arrives.
//! [`transport::Transport`] hides that handshake, [`parser`] turns status text
//! into [`reading::Reading`]s and [`logger::LogSession`] polls the device into a
//! [`sink::Sink`].
//!
//! `Transport` and `LogSession` own their stream exclusively and are not meant
//! to be shared between threads without external synchronization.

pub mod commands;
pub mod diag;
pub mod logger;
pub mod parser;
pub mod port;
pub mod reading;
pub mod sink;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use anyhow::Result;

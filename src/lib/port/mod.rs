#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod other;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(not(target_os = "linux"))]
use other::is_port_open;

pub use serialport::SerialPort;

use anyhow::{Context, Result};
use core::time::Duration;
use log::debug;
use serialport::{self, DataBits, FlowControl, Parity, SerialPortType, StopBits};
use thiserror::Error;

pub const BAUDRATE: u32 = 9600;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no usb serial adapter found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0x6001), // FTDI FT232R USB UART
    UsbId(0x0403, 0x6015), // FTDI FT230X Basic UART
    UsbId(0x067b, 0x2303), // Prolific PL2303 Serial Port
    UsbId(0x1a86, 0x7523), // QinHeng Electronics HL-340 USB-Serial adapter
];

/// Opens the instrument line at 9600 8N1. `timeout` bounds blocking reads on
/// the port itself; reply framing is done by the transport.
pub fn open_port(port_name: &str, timeout: Duration, force: bool) -> Result<Box<dyn SerialPort>> {
    let true_name: String = if port_name == "auto" {
        guess_port()?
    } else {
        port_name.to_string()
    };

    if !force && is_port_open(&true_name) {
        return Err(OpenPortError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = serialport::new(&true_name, BAUDRATE)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .with_context(|| format!("Can't open port '{}'", true_name))?;

    debug!("open_port OK: {} @ {} baud", &true_name, BAUDRATE);
    Ok(port)
}

/// Prefers a known adapter, then any USB serial port.
fn guess_port() -> Result<String> {
    let usb_ports: Vec<_> = serialport::available_ports()?
        .into_iter()
        .filter_map(|info| match &info.port_type {
            SerialPortType::UsbPort(usb_info) => Some((
                info.port_name.clone(),
                COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid)),
            )),
            SerialPortType::Unknown | SerialPortType::PciPort | SerialPortType::BluetoothPort => {
                None
            }
        })
        .filter(|(name, _)| !is_port_open(name))
        .collect();

    usb_ports
        .iter()
        .find(|(_, known)| *known)
        .or_else(|| usb_ports.first())
        .map(|(name, _)| name.clone())
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}

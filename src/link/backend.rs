//! Hardware access behind a small trait so the link manager can be driven by
//! a real serial port or an in-memory double.

use std::io::{Read, Write};
use std::time::Duration;
use tracing::trace;

use crate::types::{LinkConfig, PortInfo};
use crate::{Result, StationError};

/// An open, blocking, bidirectional link handle.
///
/// Reads must honour the timeout the handle was opened with and report it as
/// `io::ErrorKind::TimedOut` (or `WouldBlock`). `Ok(0)` means end of stream.
pub trait LinkPort: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> LinkPort for T {}

/// Source of link handles.
pub trait LinkBackend: Send + Sync + 'static {
    /// Enumerate peripherals currently present.
    fn available(&self) -> Result<Vec<PortInfo>>;

    /// Open the configured peripheral with the given read timeout.
    ///
    /// Access-denied failures must map to [`StationError::LinkPermissionDenied`].
    fn open(&self, config: &LinkConfig, read_timeout: Duration) -> Result<Box<dyn LinkPort>>;
}

/// Serial ports via the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl LinkBackend for SerialBackend {
    fn available(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(|e| {
            StationError::link_open_failed_with_source("<enumeration>", e.description.clone(), Box::new(e))
        })?;

        Ok(ports
            .into_iter()
            .map(|p| PortInfo { info: describe(&p.port_type), port: p.port_name })
            .collect())
    }

    fn open(&self, config: &LinkConfig, read_timeout: Duration) -> Result<Box<dyn LinkPort>> {
        trace!(address = %config.address, speed = config.speed, "Opening serial port");
        let port = serialport::new(config.address.as_str(), config.speed)
            .timeout(read_timeout)
            .open()
            .map_err(|e| open_error(&config.address, e))?;
        Ok(Box::new(port))
    }
}

fn describe(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().or(usb.manufacturer.as_deref()).unwrap_or("USB");
            format!("{} {:04X}:{:04X}", product, usb.vid, usb.pid)
        }
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::Unknown => String::new(),
    }
}

fn open_error(address: &str, err: serialport::Error) -> StationError {
    let description = err.description.to_ascii_lowercase();
    let denied = matches!(err.kind(), serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied))
        || description.contains("permission denied")
        || description.contains("access is denied");

    if denied {
        StationError::LinkPermissionDenied { address: address.to_string() }
    } else {
        StationError::link_open_failed_with_source(address, err.description.clone(), Box::new(err))
    }
}

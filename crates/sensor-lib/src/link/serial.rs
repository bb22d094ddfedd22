//! Physical serial port transport backed by tokio-serial

use super::{async_trait, Transport};
use crate::error::{classify_io_error, classify_serial_error, LinkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::debug;

/// Transport over an OS serial device
pub struct SerialTransport {
    path: String,
    baud: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut SerialStream, LinkError> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<(), LinkError> {
        // Drop any stale handle before reopening
        self.stream = None;

        let stream = tokio_serial::new(&self.path, self.baud)
            .timeout(Duration::from_secs(1))
            .open_native_async()
            .map_err(|e| classify_serial_error(&e))?;

        debug!(port = %self.path, baud = self.baud, "Serial port opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, LinkError> {
        let stream = self.stream()?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(LinkError::ConnectionLost("end of stream".to_string())),
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) => {
                let err = classify_io_error(&e);
                if err.is_transient() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let stream = self.stream()?;
        stream.write_all(bytes).await.map_err(|e| classify_io_error(&e))?;
        stream.flush().await.map_err(|e| classify_io_error(&e))
    }

    async fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(port = %self.path, "Serial port closed");
        }
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud)
    }
}

/// A serial port visible to the OS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
}

/// Enumerate serial ports on this machine
pub fn list_ports() -> Result<Vec<PortInfo>, LinkError> {
    let ports = tokio_serial::available_ports().map_err(|e| classify_serial_error(&e))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                SerialPortType::UsbPort(usb) => (
                    "usb".to_string(),
                    usb.product
                        .or(usb.manufacturer)
                        .or_else(|| Some(format!("{:04x}:{:04x}", usb.vid, usb.pid))),
                ),
                SerialPortType::PciPort => ("pci".to_string(), None),
                SerialPortType::BluetoothPort => ("bluetooth".to_string(), None),
                SerialPortType::Unknown => ("unknown".to_string(), None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                description,
            }
        })
        .collect())
}

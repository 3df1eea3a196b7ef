//! USB serial channel
//!
//! Drives boards attached through a USB serial adapter. The outstanding
//! buffer length comes straight from the OS transmit queue, which is what
//! the spooler's buffer gate throttles against.

use super::{ChannelResult, DeviceChannel};
use laserkit_core::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// Serial port parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
        }
    }
}

/// Channel over a USB serial adapter
pub struct SerialChannel {
    config: SerialConfig,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialChannel {
    /// Create a closed channel for the configured port
    pub fn new(config: SerialConfig) -> Self {
        SerialChannel { config, port: None }
    }

    /// Names of serial ports present on this host
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("config", &self.config)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl DeviceChannel for SerialChannel {
    fn name(&self) -> &str {
        &self.config.port
    }

    fn open(&mut self) -> ChannelResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .open()
            .map_err(|e| ChannelError::OpenFailed {
                name: self.config.port.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(
            port = %self.config.port,
            baud = self.config.baud_rate,
            "serial channel open"
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
            tracing::info!(port = %self.config.port, "serial channel closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<()> {
        let port = self.port.as_mut().ok_or_else(|| ChannelError::Closed {
            name: self.config.port.clone(),
        })?;
        port.write_all(data).map_err(|e| ChannelError::Io {
            name: self.config.port.clone(),
            reason: e.to_string(),
        })
    }

    fn outstanding_length(&self) -> usize {
        self.port
            .as_ref()
            .and_then(|p| p.bytes_to_write().ok())
            .unwrap_or(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_channel_rejects_writes() {
        let mut channel = SerialChannel::new(SerialConfig::default());
        assert!(!channel.is_open());
        assert_eq!(channel.outstanding_length(), 0);

        let err = channel.write(b"I\n").unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = SerialChannel::new(SerialConfig {
            port: "COM3".to_string(),
            ..SerialConfig::default()
        });
        assert_eq!(channel.name(), "COM3");
        channel.close().unwrap();
        channel.close().unwrap();
    }
}

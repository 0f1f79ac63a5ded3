//! # IEC 62056-21 Serial Communication
//!
//! [`MeterTransport`] over a real serial port (an IR read/write head on a USB
//! UART, typically). Mode C runs 7 data bits, even parity, one stop bit and
//! starts at 300 baud.

use crate::constants::IEC_BAUD_INITIAL;
use crate::error::IecError;
use crate::iec::transport::MeterTransport;
use crate::util::logging::log_frame;
use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Bits on the wire per character: start, 7 data, parity, stop.
const BITS_PER_CHAR: u64 = 10;

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: IEC_BAUD_INITIAL,
            timeout: Duration::from_millis(100),
        }
    }
}

/// How long `len` characters take to transmit at `baud`.
pub fn transmit_time(len: usize, baud: u32) -> Duration {
    let baud = u64::from(baud.max(1));
    Duration::from_micros(len as u64 * BITS_PER_CHAR * 1_000_000 / baud)
}

/// Serial port handle implementing [`MeterTransport`].
pub struct SerialTransport {
    port: tokio_serial::SerialStream,
    config: SerialConfig,
    /// When the last queued byte leaves the UART at the current speed.
    tx_drained_at: Instant,
}

impl SerialTransport {
    /// Opens the serial port with 7E1 framing at the configured speed.
    pub fn open(port_name: &str, config: SerialConfig) -> Result<SerialTransport, IecError> {
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Seven)
            .parity(tokio_serial::Parity::Even)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| IecError::SerialPortError(format!("{port_name}: {e}")))?;

        info!("Opened {port_name} at {} baud 7E1", config.baudrate);
        Ok(SerialTransport {
            port,
            config,
            tx_drained_at: Instant::now(),
        })
    }
}

#[async_trait]
impl MeterTransport for SerialTransport {
    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), IecError> {
        if baud == self.config.baudrate {
            return Ok(());
        }
        // The OS buffer is gone after flush(), but the UART may still be
        // shifting bytes out; changing speed now would garble them.
        self.port.flush().await?;
        tokio::time::sleep_until(self.tx_drained_at).await;

        SerialPort::set_baud_rate(&mut self.port, baud)?;
        debug!("Baud rate {} -> {baud}", self.config.baudrate);
        self.config.baudrate = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.config.baudrate
    }

    fn bytes_available(&mut self) -> Result<usize, IecError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, IecError> {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(self.config.timeout, self.port.read(&mut byte)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(_)) => Ok(Some(byte[0])),
            Ok(Err(e)) => Err(IecError::SerialPortError(e.to_string())),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), IecError> {
        log_frame("tx", data);
        self.port.write_all(data).await?;
        self.port.flush().await?;

        let start = self.tx_drained_at.max(Instant::now());
        self.tx_drained_at = start + transmit_time(data.len(), self.config.baudrate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baudrate, 300);
    }

    #[test]
    fn test_transmit_time() {
        // "/?!\r\n" at 300 baud: 5 chars * 10 bits / 300 bit/s.
        assert_eq!(transmit_time(5, 300), Duration::from_micros(166_666));
        assert_eq!(transmit_time(6, 9600), Duration::from_micros(6_250));
    }
}

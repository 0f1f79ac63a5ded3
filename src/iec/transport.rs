//! Byte transport abstraction
//!
//! The session only ever talks to a [`MeterTransport`], so it can run
//! against a real serial port or against
//! [`MockMeterPort`](crate::iec::serial_mock::MockMeterPort) in tests.

use crate::error::IecError;
use async_trait::async_trait;

/// Half-duplex byte link to the meter's optical head (7E1 framing).
#[async_trait]
pub trait MeterTransport: Send {
    /// Change the line speed. Bytes already handed to [`write`](Self::write)
    /// must still go out at the old speed.
    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), IecError>;

    /// Current line speed.
    fn baud_rate(&self) -> u32;

    /// Number of received bytes that can be read without waiting.
    fn bytes_available(&mut self) -> Result<usize, IecError>;

    /// Read the next received byte, `None` if nothing arrived.
    async fn read_byte(&mut self) -> Result<Option<u8>, IecError>;

    /// Queue bytes for transmission.
    async fn write(&mut self, data: &[u8]) -> Result<(), IecError>;
}

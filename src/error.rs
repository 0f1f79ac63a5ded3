//! # IEC 62056-21 Error Handling
//!
//! This module defines the IecError enum, which represents the different error
//! types that can occur in the iec21-rs crate, and the BccError enum reported
//! by block check character validation.

use thiserror::Error;

/// Outcome of a failed block check character computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BccError {
    /// No SOH/STX start marker in the input.
    #[error("No checkable data: start marker missing")]
    NoCheckableData,

    /// A start marker was found but no ETX followed it.
    #[error("No terminator: ETX missing")]
    NoTerminator,

    /// The byte after ETX does not match the computed value.
    #[error("BCC mismatch: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    Mismatch { expected: u8, calculated: u8 },
}

/// Represents the different error types that can occur in the crate.
#[derive(Debug, Error)]
pub enum IecError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates a frame that failed block check validation.
    #[error("Checksum error: {0}")]
    Checksum(#[from] BccError),

    /// The receive buffer filled up before a terminator arrived.
    #[error("Framing overflow after {0} bytes")]
    FramingOverflow(usize),

    /// The meter answered with NAK.
    #[error("Negative acknowledgement received")]
    ProtocolNak,

    /// No state transition within the stall interval.
    #[error("Protocol stalled in state {0}")]
    ProtocolStall(String),

    /// A response referenced a code outside the register catalog.
    #[error("Unrecognized register: {0}")]
    UnrecognizedRegister(String),

    /// A numeric field could not be parsed.
    #[error("Value parse error: {0}")]
    ValueParseError(String),

    /// The publisher failed to deliver a snapshot.
    #[error("Publish error: {0}")]
    PublishError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<std::io::Error> for IecError {
    fn from(e: std::io::Error) -> Self {
        IecError::SerialPortError(e.to_string())
    }
}

impl From<tokio_serial::Error> for IecError {
    fn from(e: tokio_serial::Error) -> Self {
        IecError::SerialPortError(e.to_string())
    }
}

//! IEC 62056-21 Protocol Constants
//!
//! This module defines the control characters, baud rate identifiers and
//! timing values used by the Mode C implementation.

// ----------------------------------------------------------------------------
// Control characters
// ----------------------------------------------------------------------------

/// Start of header
pub const SOH: u8 = 0x01;

/// Start of text
pub const STX: u8 = 0x02;

/// End of text
pub const ETX: u8 = 0x03;

/// Positive acknowledgement
pub const ACK: u8 = 0x06;

/// Negative acknowledgement
pub const NAK: u8 = 0x15;

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Line terminator used by identification lines and readout entries
pub const CRLF: &[u8] = b"\r\n";

// ----------------------------------------------------------------------------
// Baud rates and option select
// ----------------------------------------------------------------------------

/// Initial Mode C speed
pub const IEC_BAUD_INITIAL: u32 = 300;

/// Upgraded speed negotiated with baud identifier `'5'`
pub const IEC_BAUD_UPGRADED: u32 = 9600;

/// Baud identifier announcing 9600 baud support
pub const IEC_BAUD_ID_9600: u8 = b'5';

/// Protocol control character `V` for normal protocol procedure
pub const IEC_PROTOCOL_NORMAL: u8 = b'0';

/// Mode `Y`: data readout
pub const IEC_MODE_READOUT: u8 = b'0';

/// Mode `Y`: programming
pub const IEC_MODE_PROGRAMMING: u8 = b'1';

// ----------------------------------------------------------------------------
// Timing (milliseconds)
// ----------------------------------------------------------------------------

/// Minimum delay between a received frame and the next transmission
pub const IEC_TURNAROUND_MS: u64 = 20;

/// Force a full restart if the state has not changed for this long
pub const IEC_STALL_TIMEOUT_MS: u64 = 30_000;

/// Pause between register polling rounds
pub const IEC_SLEEP_MS: u64 = 2_000;

/// Extra wait after a pulse so the meter counter catches up
pub const IEC_PULSE_SETTLE_MS: u64 = 1_000;

/// Receive buffer capacity; a full readout fits comfortably
pub const IEC_RX_BUFFER_CAPACITY: usize = 512;

// ----------------------------------------------------------------------------
// Publish policy
// ----------------------------------------------------------------------------

/// Publish unconditionally after this long
pub const PUBLISH_HEARTBEAT_MS: u64 = 120_000;

/// Publish after this long when the load is high
pub const PUBLISH_HIGH_POWER_MS: u64 = 60_000;

/// Publish after this long when the power changed significantly
pub const PUBLISH_SIGNIFICANT_MS: u64 = 25_000;

/// Watts above which a load counts as high
pub const PUBLISH_HIGH_POWER_WATT: i32 = 1_000;

// ----------------------------------------------------------------------------
// Power estimation
// ----------------------------------------------------------------------------

/// Milliseconds per hour; `Wh * MS_PER_HOUR / ms` yields watts
pub const MS_PER_HOUR: u64 = 3_600_000;

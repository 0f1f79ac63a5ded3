//! # Byte Display Utilities
//!
//! IEC 62056-21 traffic is mostly ASCII framed by a handful of control
//! characters. These helpers render it readably for logs and decode hex
//! input given on the command line.
//!
//! ```rust
//! use iec21_rs::util::hex::{decode_hex, format_iec};
//!
//! assert_eq!(format_iec(b"\x01B0\x03q"), "<SOH>B0<ETX>q");
//! assert_eq!(decode_hex("01 42 30").unwrap(), vec![0x01, 0x42, 0x30]);
//! ```

use crate::constants::{ACK, ETX, NAK, SOH, STX};
use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    if hex_str.is_empty() {
        return Err(HexError::EmptyString);
    }

    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Format hex data for compact display, e.g. "01 42 30".
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render protocol bytes as text with control characters named.
///
/// CR and LF are shown as `\r` and `\n`; other non-printable bytes as `<xx>`.
pub fn format_iec(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 8);
    for &byte in data {
        match byte {
            SOH => out.push_str("<SOH>"),
            STX => out.push_str("<STX>"),
            ETX => out.push_str("<ETX>"),
            ACK => out.push_str("<ACK>"),
            NAK => out.push_str("<NAK>"),
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            b if b.is_ascii_graphic() || b == b' ' => out.push(b as char),
            b => out.push_str(&format!("<{b:02x}>")),
        }
    }
    out
}

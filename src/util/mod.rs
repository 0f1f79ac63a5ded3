//! # Utility Modules
//!
//! Common helpers used throughout the iec21-rs crate: byte rendering and hex
//! decoding, plus logging patterns for protocol traffic.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, format_iec, HexError};
pub use logging::{log_frame, LogThrottle};

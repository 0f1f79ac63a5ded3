//! # IEC 62056-21 Frame Codec
//!
//! Block check character (BCC) computation, the request frames the client
//! sends, and the bounded assembler that cuts the incoming byte stream into
//! identification lines and data blocks.
//!
//! ## Frame shapes
//!
//! | Exchange | Bytes |
//! |---|---|
//! | Login | `/?!\r\n` |
//! | Option select | `ACK V Z Y \r\n` |
//! | Data block | `STX payload ETX bcc` |
//! | Program-mode ack | `SOH P0 STX () ETX bcc` |
//! | Register read | `SOH R1 STX code() ETX bcc` |
//! | Break | `SOH B0 ETX q` |
//!
//! The BCC is the XOR of every byte after the first SOH/STX up to and
//! including ETX.
//!
//! ```rust
//! use iec21_rs::iec::frame::{break_request, checksum};
//!
//! assert_eq!(checksum(&break_request()), Ok(b'q'));
//! ```

use crate::constants::{ACK, CRLF, ETX, NAK, SOH, STX};
use crate::error::BccError;
use bytes::{BufMut, Bytes, BytesMut};

/// Compute or verify the BCC of the first frame in `data`.
///
/// Returns the computed value whether or not a trailing BCC byte is
/// present, so the same function serves to append a checksum and to check
/// one.
pub fn checksum(data: &[u8]) -> Result<u8, BccError> {
    let start = data
        .iter()
        .position(|&b| b == SOH || b == STX)
        .ok_or(BccError::NoCheckableData)?;

    let mut bcc = 0u8;
    for (offset, &byte) in data[start + 1..].iter().enumerate() {
        bcc ^= byte;
        if byte == ETX {
            let trailing = data.get(start + 1 + offset + 1);
            return match trailing {
                Some(&expected) if expected != bcc => Err(BccError::Mismatch {
                    expected,
                    calculated: bcc,
                }),
                _ => Ok(bcc),
            };
        }
    }

    Err(BccError::NoTerminator)
}

/// Append the BCC of everything in `buf` and freeze it.
fn seal(mut buf: BytesMut) -> Bytes {
    // Every sealed frame contains a start marker and ETX.
    let bcc = checksum(&buf).unwrap_or_default();
    buf.put_u8(bcc);
    buf.freeze()
}

/// Sign-on request, sent at the initial baud rate.
pub fn login_request() -> Bytes {
    Bytes::from_static(b"/?!\r\n")
}

/// Acknowledgement/option select message: `ACK V Z Y CR LF`.
pub fn option_select(protocol: u8, baud_id: u8, mode: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(ACK);
    buf.put_u8(protocol);
    buf.put_u8(baud_id);
    buf.put_u8(mode);
    buf.put_slice(CRLF);
    buf.freeze()
}

/// Programming-mode read command for one register.
pub fn program_read_request(code: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(code.len() + 8);
    buf.put_u8(SOH);
    buf.put_slice(b"R1");
    buf.put_u8(STX);
    buf.put_slice(code.as_bytes());
    buf.put_slice(b"()");
    buf.put_u8(ETX);
    seal(buf)
}

/// Break (disconnect) command. Its BCC is always `'q'`.
pub fn break_request() -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(SOH);
    buf.put_slice(b"B0");
    buf.put_u8(ETX);
    seal(buf)
}

/// The operand-less password prompt a meter sends on entering programming
/// mode: `SOH P0 STX () ETX bcc`.
pub fn program_ack() -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(SOH);
    buf.put_slice(b"P0");
    buf.put_u8(STX);
    buf.put_slice(b"()");
    buf.put_u8(ETX);
    seal(buf)
}

/// Wrap a payload into a data block, `STX payload ETX bcc`.
pub fn data_block(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 3);
    buf.put_u8(STX);
    buf.put_slice(payload);
    buf.put_u8(ETX);
    seal(buf)
}

/// Whether `frame` (noise before SOH allowed) is exactly the program ack.
pub fn is_program_ack(frame: &[u8]) -> bool {
    let expected = program_ack();
    frame
        .iter()
        .position(|&b| b == SOH)
        .is_some_and(|start| frame[start..] == expected[..])
}

/// The data between the innermost start marker and ETX.
///
/// For `SOH R1 STX 1.8.0() ETX x` this is `1.8.0()`.
pub fn block_payload(frame: &[u8]) -> Option<&[u8]> {
    let start = frame
        .iter()
        .position(|&b| b == STX)
        .or_else(|| frame.iter().position(|&b| b == SOH))?;
    let end = start + 1 + frame[start + 1..].iter().position(|&b| b == ETX)?;
    Some(&frame[start + 1..end])
}

/// What the assembler is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerMode {
    /// A line ending in CR LF (identification message).
    Line,
    /// A block ending in ETX plus BCC.
    Block,
}

/// Result of feeding one byte to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// A complete line, terminator included.
    Line(Vec<u8>),
    /// A candidate block ending in ETX + BCC, not yet verified.
    Block(Vec<u8>),
    /// The meter rejected the last request.
    Nak,
    /// Buffer capacity exhausted without a terminator; contents dropped.
    /// Reported once, the rest of the frame is skipped up to the next
    /// start marker.
    Overflow(usize),
}

/// Bounded receive buffer that splits the byte stream into frames.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    capacity: usize,
    mode: AssemblerMode,
    discarding: bool,
}

impl FrameAssembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            mode: AssemblerMode::Line,
            discarding: false,
        }
    }

    /// Switch mode; any partial data is discarded.
    pub fn expect(&mut self, mode: AssemblerMode) {
        self.mode = mode;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    fn is_start_marker(&self, byte: u8) -> bool {
        match self.mode {
            AssemblerMode::Line => byte == b'/',
            AssemblerMode::Block => byte == SOH || byte == STX,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Feed one received byte.
    pub fn push(&mut self, byte: u8) -> Option<AssemblerEvent> {
        // The byte after ETX is a BCC even when its value happens to be NAK.
        let bcc_position = self.mode == AssemblerMode::Block && self.buf.last() == Some(&ETX);

        if byte == NAK && !bcc_position {
            self.clear();
            return Some(AssemblerEvent::Nak);
        }

        if self.discarding {
            if !self.is_start_marker(byte) {
                return None;
            }
            self.discarding = false;
        }

        if self.buf.len() >= self.capacity {
            let dropped = self.buf.len();
            self.buf.clear();
            self.discarding = true;
            return Some(AssemblerEvent::Overflow(dropped));
        }

        self.buf.push(byte);

        match self.mode {
            AssemblerMode::Line if self.buf.ends_with(CRLF) => {
                Some(AssemblerEvent::Line(std::mem::take(&mut self.buf)))
            }
            AssemblerMode::Block if bcc_position => {
                Some(AssemblerEvent::Block(std::mem::take(&mut self.buf)))
            }
            _ => None,
        }
    }
}

//! Identification message parsing.
//!
//! The meter answers a sign-on with `/XXXZ<ident>\r\n`: three manufacturer
//! characters, one baud rate identifier and a free-form identification.

use crate::constants::IEC_BAUD_ID_9600;
use crate::error::IecError;
use std::fmt;

/// A parsed identification message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub manufacturer: String,
    pub baud_id: u8,
    pub ident: String,
}

impl Identification {
    /// Parse an identification line. Bytes before the `/` are ignored.
    pub fn parse(line: &[u8]) -> Result<Self, IecError> {
        let start = line
            .iter()
            .position(|&b| b == b'/')
            .ok_or_else(|| IecError::Other("identification without '/'".into()))?;
        let body = &line[start + 1..];
        let body = body.strip_suffix(b"\r\n").unwrap_or(body);

        if body.len() < 4 || !body.is_ascii() {
            return Err(IecError::Other(format!(
                "short or non-ASCII identification: {}",
                crate::util::hex::format_iec(line)
            )));
        }

        Ok(Identification {
            manufacturer: String::from_utf8_lossy(&body[..3]).into_owned(),
            baud_id: body[3],
            ident: String::from_utf8_lossy(&body[4..]).trim().to_string(),
        })
    }

    /// Whether the meter offers the 9600 baud upgrade.
    pub fn is_upgradeable(&self) -> bool {
        self.baud_id == IEC_BAUD_ID_9600
    }

    /// Highest Mode C baud rate announced, if the identifier is known.
    pub fn max_baud(&self) -> Option<u32> {
        match self.baud_id {
            b'0' => Some(300),
            b'1' => Some(600),
            b'2' => Some(1200),
            b'3' => Some(2400),
            b'4' => Some(4800),
            b'5' => Some(9600),
            b'6' => Some(19200),
            _ => None,
        }
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.manufacturer, self.baud_id as char, self.ident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upgradeable() {
        let id = Identification::parse(b"/ISk5ME162-0001\r\n").unwrap();
        assert_eq!(id.manufacturer, "ISk");
        assert_eq!(id.baud_id, b'5');
        assert_eq!(id.ident, "ME162-0001");
        assert!(id.is_upgradeable());
        assert_eq!(id.max_baud(), Some(9600));
        assert_eq!(id.to_string(), "ISk5ME162-0001");
    }

    #[test]
    fn test_parse_not_upgradeable() {
        let id = Identification::parse(b"\x00/LGZ4ZMD\r\n").unwrap();
        assert!(!id.is_upgradeable());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Identification::parse(b"garbage\r\n").is_err());
        assert!(Identification::parse(b"/IS\r\n").is_err());
    }
}

//! Unit tests for the `IecError` and `BccError` enums and their `Display`
//! implementations.

use iec21_rs::{BccError, IecError};

/// Tests that the `SerialPortError` variant is correctly formatted.
#[test]
fn test_serial_port_error() {
    let err = IecError::SerialPortError("/dev/ttyUSB0: no such file".to_string());
    assert_eq!(err.to_string(), "Serial port error: /dev/ttyUSB0: no such file");
}

/// Tests that a `BccError` converts into `IecError::Checksum`.
#[test]
fn test_checksum_error_from_bcc() {
    let err: IecError = BccError::Mismatch {
        expected: 0x23,
        calculated: 0x22,
    }
    .into();
    assert!(matches!(err, IecError::Checksum(BccError::Mismatch { .. })));
    assert_eq!(
        err.to_string(),
        "Checksum error: BCC mismatch: expected 0x23, calculated 0x22"
    );
}

/// Tests the `BccError` messages.
#[test]
fn test_bcc_error_messages() {
    assert_eq!(
        BccError::NoCheckableData.to_string(),
        "No checkable data: start marker missing"
    );
    assert_eq!(BccError::NoTerminator.to_string(), "No terminator: ETX missing");
}

/// Tests the protocol-level variants.
#[test]
fn test_protocol_errors() {
    assert_eq!(
        IecError::FramingOverflow(512).to_string(),
        "Framing overflow after 512 bytes"
    );
    assert_eq!(
        IecError::ProtocolNak.to_string(),
        "Negative acknowledgement received"
    );
    assert_eq!(
        IecError::ProtocolStall("AwaitIdentification".into()).to_string(),
        "Protocol stalled in state AwaitIdentification"
    );
    assert_eq!(
        IecError::UnrecognizedRegister("3.8.2".into()).to_string(),
        "Unrecognized register: 3.8.2"
    );
}

/// Tests that I/O errors map onto `SerialPortError`.
#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
    let err: IecError = io.into();
    assert!(matches!(err, IecError::SerialPortError(msg) if msg == "timed out"));
}

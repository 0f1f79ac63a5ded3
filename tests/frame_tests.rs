//! Unit tests for the `frame.rs` module: block check characters, request
//! builders and frame assembly.

use iec21_rs::constants::{ETX, NAK, SOH, STX};
use iec21_rs::iec::frame::{
    block_payload, break_request, checksum, data_block, is_program_ack, login_request,
    option_select, program_ack, program_read_request, AssemblerEvent, AssemblerMode,
    FrameAssembler,
};
use iec21_rs::BccError;

/// Tests the checksum of inputs without start marker, without ETX and of
/// the two literal frames.
#[test]
fn test_checksum_literals() {
    assert_eq!(checksum(b"void"), Err(BccError::NoCheckableData));
    assert_eq!(checksum(&[STX, b'n', b'o', b'_', b'e', b't', b'x']), Err(BccError::NoTerminator));
    assert_eq!(checksum(&[STX, b'!', ETX]), Ok(0x22));
    assert_eq!(checksum(&[SOH, b'B', b'0', ETX, b'q']), Ok(b'q'));
}

/// Tests that a wrong trailing byte is reported with both values.
#[test]
fn test_checksum_mismatch() {
    let err = checksum(&[STX, b'!', ETX, 0x21]).unwrap_err();
    assert_eq!(
        err,
        BccError::Mismatch {
            expected: 0x21,
            calculated: 0x22
        }
    );
}

/// Tests that bytes before the start marker are not part of the BCC.
#[test]
fn test_checksum_skips_leading_noise() {
    assert_eq!(checksum(&[0xFF, b'x', STX, b'!', ETX]), Ok(0x22));
}

/// Tests that the request builders produce bit-exact wire bytes.
#[test]
fn test_request_builders() {
    assert_eq!(&login_request()[..], b"/?!\r\n");
    assert_eq!(&option_select(b'0', b'5', b'0')[..], b"\x06050\r\n");
    assert_eq!(&option_select(b'0', b'5', b'1')[..], b"\x06051\r\n");
    assert_eq!(&break_request()[..], b"\x01B0\x03q");
    assert_eq!(&program_read_request("1.8.0")[..], b"\x01R1\x021.8.0()\x03\x5a");
    assert_eq!(&program_read_request("2.8.0")[..], b"\x01R1\x022.8.0()\x03\x59");
    assert_eq!(&program_ack()[..], b"\x01P0\x02()\x03\x60");
}

/// Tests recognition of the programming mode acknowledgement.
#[test]
fn test_is_program_ack() {
    assert!(is_program_ack(&program_ack()));
    assert!(!is_program_ack(&data_block(b"()")));
    assert!(!is_program_ack(b"\x01P0\x02()\x03\x61"));
}

/// Tests extraction of the data between markers.
#[test]
fn test_block_payload() {
    let block = data_block(b"1.8.0(0000001.000*kWh)");
    assert_eq!(block_payload(&block), Some(&b"1.8.0(0000001.000*kWh)"[..]));
    assert_eq!(block_payload(b"no markers"), None);
}

/// Tests that a data block assembles byte by byte and verifies.
#[test]
fn test_assemble_block() {
    let block = data_block(b"F.F(00)\r\n!\r\n");
    let mut assembler = FrameAssembler::new(512);
    assembler.expect(AssemblerMode::Block);

    let mut events = Vec::new();
    for &byte in block.iter() {
        if let Some(event) = assembler.push(byte) {
            events.push(event);
        }
    }

    assert_eq!(events, vec![AssemblerEvent::Block(block.to_vec())]);
    assert!(assembler.is_empty());
    assert!(checksum(&block).is_ok());
}

/// Tests that a BCC byte equal to NAK completes the block instead of
/// aborting it, while a NAK inside the block aborts.
#[test]
fn test_bcc_valued_nak_is_not_a_nak() {
    let mut assembler = FrameAssembler::new(64);
    assembler.expect(AssemblerMode::Block);

    assert_eq!(assembler.push(STX), None);
    assert_eq!(assembler.push(NAK), Some(AssemblerEvent::Nak));

    // 'A' ^ 'W' ^ ETX == NAK
    let bcc = b'A' ^ b'W' ^ ETX;
    assert_eq!(bcc, NAK);
    for &byte in &[STX, b'A', b'W', ETX] {
        assert_eq!(assembler.push(byte), None);
    }
    let block = vec![STX, b'A', b'W', ETX, NAK];
    assert_eq!(assembler.push(bcc), Some(AssemblerEvent::Block(block.clone())));
    assert_eq!(checksum(&block), Ok(NAK));
}

/// Tests line assembly of the identification message.
#[test]
fn test_assemble_line() {
    let mut assembler = FrameAssembler::new(64);
    let mut last = None;
    for &byte in b"/ISk5ME162-0001\r\n" {
        last = assembler.push(byte);
    }
    assert_eq!(last, Some(AssemblerEvent::Line(b"/ISk5ME162-0001\r\n".to_vec())));
}

/// Tests that the bounded buffer reports an overflow once and restarts.
#[test]
fn test_assembler_overflow() {
    let mut assembler = FrameAssembler::new(16);
    assembler.expect(AssemblerMode::Block);

    let events: Vec<_> = std::iter::repeat(b'x')
        .take(100)
        .filter_map(|b| assembler.push(b))
        .collect();
    assert_eq!(events, vec![AssemblerEvent::Overflow(16)]);
    assert!(assembler.is_empty());
}

/// Tests that a line-mode overflow resumes at the next identification.
#[test]
fn test_line_overflow_resumes_at_slash() {
    let mut assembler = FrameAssembler::new(16);
    let mut input = vec![b'x'; 40];
    input.extend_from_slice(b"/ABC4XYZ\r\n");
    let events: Vec<_> = input.iter().filter_map(|&b| assembler.push(b)).collect();
    assert_eq!(
        events,
        vec![
            AssemblerEvent::Overflow(16),
            AssemblerEvent::Line(b"/ABC4XYZ\r\n".to_vec()),
        ]
    );
}

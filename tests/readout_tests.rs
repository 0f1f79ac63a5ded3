//! Unit tests for the data readout parser.

use iec21_rs::iec::frame::{block_payload, data_block};
use iec21_rs::payload::{parse_readout, parse_value, RegisterId};

const READOUT: &[u8] = b"C.1.0(28342193)\r\n\
1.8.0(0032826.545*kWh)\r\n\
3.8.2(bogus)\r\n\
2.8.0(0000000.001*kWh)\r\n\
!\r\n";

/// Tests the readout example with an unrecognized entry in between.
#[test]
fn test_parse_readout_example() {
    let table = parse_readout(READOUT);
    assert_eq!(table.get(RegisterId::SerialNumber), 28_342_193);
    assert_eq!(table.get(RegisterId::PositiveEnergy), 32_826_545);
    assert_eq!(table.get(RegisterId::NegativeEnergy), 1);
    assert_eq!(table.iter().count(), 3);
}

/// Tests that a whole data block, markers and BCC included, parses the same.
#[test]
fn test_parse_framed_readout() {
    let block = data_block(READOUT);
    let from_payload = parse_readout(block_payload(&block).unwrap());
    let from_block = parse_readout(&block);
    assert_eq!(from_payload, parse_readout(READOUT));
    assert_eq!(from_block.get(RegisterId::NegativeEnergy), 1);
}

/// Tests that malformed entries are skipped without affecting others.
#[test]
fn test_malformed_entries_skipped() {
    let table = parse_readout(b"garbage\r\n1.8.0(12.5*kWh)\r\nF.F(00)\r\n2.8.0(\r\n");
    assert!(!table.contains(RegisterId::PositiveEnergy));
    assert!(!table.contains(RegisterId::NegativeEnergy));
    assert_eq!(table.try_get(RegisterId::FatalError), Some(0));
}

/// Tests that the prefixed code form used by many meters is accepted.
#[test]
fn test_prefixed_codes() {
    let table = parse_readout(b"1-0:1.8.0(0000010.000*kWh)\r\n1-0:2.8.0(0000000.250*kWh)\r\n");
    assert_eq!(table.get(RegisterId::PositiveEnergy), 10_000);
    assert_eq!(table.get(RegisterId::NegativeEnergy), 250);
}

/// Tests the value notations.
#[test]
fn test_parse_value() {
    assert_eq!(parse_value("0032826.545*kWh"), Some(32_826_545));
    assert_eq!(parse_value("0000000.000*kWh"), Some(0));
    assert_eq!(parse_value("28342193"), Some(28_342_193));
    assert_eq!(parse_value("32826.545*kWh"), None);
    assert_eq!(parse_value("0032826.545*Wh"), None);
    assert_eq!(parse_value("bogus"), None);
    assert_eq!(parse_value(""), None);
}

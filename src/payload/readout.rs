//! # Data Readout Parser
//!
//! Decodes the bulk `code(value)` dump a meter sends in readout mode into a
//! [`ValueTable`]. Values in the fixed-point `NNNNNNN.NNN*kWh` notation are
//! converted to integer Wh; other values must be plain integers. Entries that
//! do not parse, or whose code is outside the catalog, are skipped.
//!
//! ```rust
//! use iec21_rs::payload::{parse_readout, RegisterId};
//!
//! let table = parse_readout(b"1.8.0(0032826.545*kWh)\r\n!\r\n");
//! assert_eq!(table.get(RegisterId::PositiveEnergy), 32_826_545);
//! ```

use crate::payload::register::{RegisterId, ValueTable};
use log::{debug, trace};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, map_res},
    sequence::delimited,
    IResult,
};

/// Splits one entry into its code and the contents of the first `(...)`.
pub fn parse_entry(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, code) = take_till1(|c| c == '(')(input)?;
    let (input, value) = delimited(char('('), take_till(|c| c == ')'), char(')'))(input)?;
    Ok((input, (code.trim(), value)))
}

fn digits(count: usize) -> impl Fn(&str) -> IResult<&str, u64> {
    move |input| {
        map_res(
            take_while_m_n(count, count, |c: char| c.is_ascii_digit()),
            str::parse::<u64>,
        )(input)
    }
}

/// `NNNNNNN.NNN*kWh` as Wh.
fn kwh_value(input: &str) -> IResult<&str, u64> {
    let (input, kwh) = digits(7)(input)?;
    let (input, _) = char('.')(input)?;
    let (input, wh) = digits(3)(input)?;
    let (input, _) = tag("*kWh")(input)?;
    Ok((input, kwh * 1000 + wh))
}

fn plain_value(input: &str) -> IResult<&str, u64> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), str::parse::<u64>)(input)
}

/// Parse a register value; `None` when it is neither kWh nor an integer.
pub fn parse_value(value: &str) -> Option<u64> {
    all_consuming(alt((kwh_value, plain_value)))(value.trim())
        .ok()
        .map(|(_, v)| v)
}

/// Parse the payload of a data readout block.
///
/// Framing bytes (STX/ETX) around the payload are tolerated. The table is
/// built from scratch; nothing carries over from earlier readouts.
pub fn parse_readout(payload: &[u8]) -> ValueTable {
    let mut table = ValueTable::new();
    let text = String::from_utf8_lossy(payload);

    for line in text.split(['\n', crate::constants::STX as char, crate::constants::ETX as char]) {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() || line == "!" {
            continue;
        }

        let (code, raw) = match parse_entry(line) {
            Ok((_, entry)) => entry,
            Err(_) => {
                debug!("Skipping malformed readout line: {line:?}");
                continue;
            }
        };

        let Some(id) = RegisterId::from_code(code) else {
            trace!("Ignoring register {code}");
            continue;
        };

        match parse_value(raw) {
            Some(value) => table.set(id, value),
            None => debug!("Skipping {id}: unparseable value {raw:?}"),
        }
    }

    table
}

//! The payload module handles the contents of IEC 62056-21 data blocks: the
//! register catalog and the readout/value parsers.

pub mod readout;
pub mod register;

pub use readout::{parse_entry, parse_readout, parse_value};
pub use register::{RegisterId, ValueTable};

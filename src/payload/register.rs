//! # Register Catalog
//!
//! The closed set of OBIS data identifiers this crate understands, and the
//! value table filled from readouts and register polls. Codes the meter
//! reports beyond this catalog are simply not modeled.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;

/// A recognized meter register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum RegisterId {
    #[serde(rename = "C.1.0")]
    SerialNumber,
    #[serde(rename = "F.F")]
    FatalError,
    #[serde(rename = "0.9.1")]
    Time,
    #[serde(rename = "0.9.2")]
    Date,
    #[serde(rename = "1.8.0")]
    PositiveEnergy,
    #[serde(rename = "2.8.0")]
    NegativeEnergy,
}

/// (id, code) pairs in catalog order.
const REGISTER_CODES: [(RegisterId, &str); RegisterId::COUNT] = [
    (RegisterId::SerialNumber, "C.1.0"),
    (RegisterId::FatalError, "F.F"),
    (RegisterId::Time, "0.9.1"),
    (RegisterId::Date, "0.9.2"),
    (RegisterId::PositiveEnergy, "1.8.0"),
    (RegisterId::NegativeEnergy, "2.8.0"),
];

impl RegisterId {
    pub const COUNT: usize = 6;

    /// The whole catalog, in order.
    pub const ALL: [RegisterId; RegisterId::COUNT] = [
        RegisterId::SerialNumber,
        RegisterId::FatalError,
        RegisterId::Time,
        RegisterId::Date,
        RegisterId::PositiveEnergy,
        RegisterId::NegativeEnergy,
    ];

    /// The short ASCII code of this register, e.g. `"1.8.0"`.
    pub fn code(self) -> &'static str {
        REGISTER_CODES[self.index()].1
    }

    /// Look up a code; `None` for anything outside the catalog.
    ///
    /// A leading medium/channel prefix like `1-0:` is ignored.
    pub fn from_code(code: &str) -> Option<RegisterId> {
        let code = code.trim();
        let code = code.rsplit_once(':').map_or(code, |(_, rest)| rest);
        REGISTER_CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(id, _)| *id)
    }

    /// Position in the catalog.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this register carries a cumulative Wh total.
    pub fn is_energy(self) -> bool {
        matches!(self, RegisterId::PositiveEnergy | RegisterId::NegativeEnergy)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RegisterId {
    type Err = crate::error::IecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegisterId::from_code(s)
            .ok_or_else(|| crate::error::IecError::UnrecognizedRegister(s.to_string()))
    }
}

/// Register values; energy registers in Wh. Missing entries read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueTable {
    values: [u64; RegisterId::COUNT],
    present: [bool; RegisterId::COUNT],
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RegisterId) -> u64 {
        self.values[id.index()]
    }

    /// `Some` only for registers that were actually reported.
    pub fn try_get(&self, id: RegisterId) -> Option<u64> {
        self.present[id.index()].then(|| self.values[id.index()])
    }

    pub fn set(&mut self, id: RegisterId, value: u64) {
        self.values[id.index()] = value;
        self.present[id.index()] = true;
    }

    pub fn contains(&self, id: RegisterId) -> bool {
        self.present[id.index()]
    }

    /// Reported registers and their values, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, u64)> + '_ {
        RegisterId::ALL
            .into_iter()
            .filter(|id| self.contains(*id))
            .map(|id| (id, self.get(id)))
    }
}

impl Serialize for ValueTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (id, value) in self.iter() {
            map.serialize_entry(id.code(), &value)?;
        }
        map.end()
    }
}

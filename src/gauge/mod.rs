//! The gauge module turns cumulative energy totals into power estimates:
//! a windowed averager per flow direction and a combiner that nets them and
//! decides whether a change deserves to be reported.

pub mod combiner;
pub mod window;

pub use combiner::EnergyGauge;
pub use window::{Anchor, WattGauge};

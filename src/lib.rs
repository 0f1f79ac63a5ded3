//! # iec21-rs - IEC 62056-21 Mode C Meter Reading in Rust
//!
//! The iec21-rs crate reads an electricity meter through its optical port
//! using the IEC 62056-21 "Mode C" handshake and turns the cumulative
//! energy registers into a stable estimate of the current power.
//!
//! ## Features
//!
//! - Mode C sign-on with baud rate upgrade to 9600 and programming-mode register polling
//! - Passive data readout for meters without the upgrade
//! - Block check character validation and bounded frame assembly
//! - NAK retries and watchdog recovery from stalled exchanges
//! - Windowed import/export power estimation with change hysteresis
//! - Pluggable transport, publisher and pulse input
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! iec21-rs = "0.3.0"
//! ```
//!
//! ```rust,no_run
//! use iec21_rs::{
//!     init_logger, run_forever, LogPublisher, NoPulseInput, SerialConfig, SerialTransport,
//!     Session, SessionConfig,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), iec21_rs::IecError> {
//! init_logger();
//! let port = SerialTransport::open("/dev/ttyUSB0", SerialConfig::default())?;
//! let mut session = Session::new(port, LogPublisher, NoPulseInput, SessionConfig::default())?;
//! run_forever(&mut session, Duration::from_millis(5)).await;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod gauge;
pub mod iec;
pub mod logging;
pub mod payload;
pub mod publisher;
pub mod util;

pub use crate::error::{BccError, IecError};
pub use crate::logging::{init_logger, init_logger_with_level, log_info};

// Protocol
pub use iec::{
    checksum, run_forever, Identification, MeterTransport, MockMeterPort, NoPulseInput,
    PulseInput, SerialConfig, SerialTransport, Session, SessionConfig, SessionStats, State,
};

// Data
pub use gauge::{EnergyGauge, WattGauge};
pub use payload::{parse_readout, parse_value, RegisterId, ValueTable};
pub use publisher::{JsonLinePublisher, LogPublisher, MemoryPublisher, Publisher, Snapshot};

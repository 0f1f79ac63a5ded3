//! The iec module implements the IEC 62056-21 Mode C link layer: frame
//! codec, identification parsing, the protocol session and the byte
//! transports it runs on.

pub mod frame;
pub mod identification;
pub mod pulse;
pub mod serial;
pub mod serial_mock;
pub mod session;
pub mod transport;

pub use frame::{checksum, AssemblerEvent, AssemblerMode, FrameAssembler};
pub use identification::Identification;
pub use pulse::{LevelPulseDetector, NoPulseInput, PulseInput};
pub use serial::{SerialConfig, SerialTransport};
pub use serial_mock::MockMeterPort;
pub use session::{publish_reason, run_forever, Session, SessionConfig, SessionStats, State};
pub use transport::MeterTransport;

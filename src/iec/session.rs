//! # Mode C Protocol Session
//!
//! The session drives one meter connection through the IEC 62056-21 Mode C
//! handshake and then polls the energy registers forever:
//!
//! ```text
//! Login -> AwaitIdentification -> RequestDataMode -> AwaitReadout
//!       -> Restart -> Login2 -> AwaitIdentification2
//!       -> RequestProgramMode -> AwaitProgramAck
//!       -> RequestRegister(0) -> AwaitRegister(0) -> ... -> MaybePublish
//!       -> Sleep -> RequestRegister(0) -> ...
//! ```
//!
//! Meters that do not offer the 9600 baud upgrade are read passively:
//! `AwaitIdentification* -> ReadoutSlow -> Restart -> Login2 -> ...`.
//!
//! [`Session::poll`] never blocks. It is called with the current monotonic
//! time in milliseconds and does at most one step: either one entry action
//! (a write) or the processing of one received frame. Waits such as the
//! turnaround delay are expressed through a `not_before` timestamp.

use crate::constants::*;
use crate::error::IecError;
use crate::gauge::EnergyGauge;
use crate::iec::frame::{self, AssemblerEvent, AssemblerMode, FrameAssembler};
use crate::iec::identification::Identification;
use crate::iec::pulse::PulseInput;
use crate::iec::transport::MeterTransport;
use crate::payload::{parse_readout, parse_value, RegisterId, ValueTable};
use crate::publisher::{Diagnostics, PublishReason, Publisher, Snapshot};
use crate::util::hex::format_iec;
use crate::util::logging::{log_frame, LogThrottle};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Pause after a failed poll before the restarted session touches the port.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Login,
    AwaitIdentification,
    RequestDataMode,
    AwaitReadout,
    ReadoutSlow,
    Restart,
    Login2,
    AwaitIdentification2,
    RequestProgramMode,
    AwaitProgramAck,
    /// Index into [`SessionConfig::registers`].
    RequestRegister(usize),
    AwaitRegister(usize),
    MaybePublish,
    Sleep,
}

impl State {
    /// States waiting for bytes from the meter.
    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            State::AwaitIdentification
                | State::AwaitIdentification2
                | State::AwaitReadout
                | State::ReadoutSlow
                | State::AwaitProgramAck
                | State::AwaitRegister(_)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Session tuning. Defaults come from [`crate::constants`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Registers polled in programming mode, in order.
    pub registers: Vec<RegisterId>,
    pub stall_timeout_ms: u64,
    pub sleep_ms: u64,
    pub pulse_settle_ms: u64,
    pub turnaround_ms: u64,
    pub rx_capacity: usize,
    pub initial_baud: u32,
    pub upgraded_baud: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            registers: vec![RegisterId::PositiveEnergy, RegisterId::NegativeEnergy],
            stall_timeout_ms: IEC_STALL_TIMEOUT_MS,
            sleep_ms: IEC_SLEEP_MS,
            pulse_settle_ms: IEC_PULSE_SETTLE_MS,
            turnaround_ms: IEC_TURNAROUND_MS,
            rx_capacity: IEC_RX_BUFFER_CAPACITY,
            initial_baud: IEC_BAUD_INITIAL,
            upgraded_baud: IEC_BAUD_UPGRADED,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), IecError> {
        if self.registers.is_empty() {
            return Err(IecError::ConfigError("no registers to poll".into()));
        }
        if self.stall_timeout_ms == 0 {
            return Err(IecError::ConfigError("stall timeout must be non-zero".into()));
        }
        if self.rx_capacity < 16 {
            return Err(IecError::ConfigError(format!(
                "receive buffer of {} bytes is too small",
                self.rx_capacity
            )));
        }
        if self.initial_baud == 0 || self.upgraded_baud == 0 {
            return Err(IecError::ConfigError("baud rate must be non-zero".into()));
        }
        Ok(())
    }
}

/// Counters reported with every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_ok: u32,
    pub checksum_errors: u32,
    pub naks: u32,
    pub overflows: u32,
    pub watchdog_restarts: u32,
    pub readouts: u32,
    pub publishes: u32,
}

/// Decide whether a snapshot is due, `elapsed_ms` after the last one.
pub fn publish_reason(elapsed_ms: u64, power_watt: i32, significant: bool) -> Option<PublishReason> {
    if elapsed_ms >= PUBLISH_HEARTBEAT_MS {
        Some(PublishReason::Heartbeat)
    } else if elapsed_ms >= PUBLISH_HIGH_POWER_MS && power_watt.abs() > PUBLISH_HIGH_POWER_WATT {
        Some(PublishReason::HighPower)
    } else if elapsed_ms >= PUBLISH_SIGNIFICANT_MS && significant {
        Some(PublishReason::SignificantChange)
    } else {
        None
    }
}

/// `code(value)` or `(value)`; the code is `None` when absent.
fn split_register_response(text: &str) -> Option<(Option<&str>, &str)> {
    let open = text.find('(')?;
    let close = open + text[open..].find(')')?;
    let code = text[..open].trim();
    let code = (!code.is_empty()).then_some(code);
    Some((code, &text[open + 1..close]))
}

/// One meter connection.
pub struct Session<T, P, I>
where
    T: MeterTransport,
    P: Publisher,
    I: PulseInput,
{
    transport: T,
    publisher: P,
    pulse: I,
    config: SessionConfig,

    state: State,
    /// Re-entered when the meter answers NAK.
    retry_state: State,
    state_since: u64,
    not_before: u64,
    started_at: u64,
    last_publish: u64,
    epoch: Instant,

    assembler: FrameAssembler,
    /// Last frame written, to recognize an echo from the optical head.
    last_request: Vec<u8>,
    identification: Option<Identification>,
    values: ValueTable,
    gauge: EnergyGauge,
    stats: SessionStats,
    bcc_throttle: LogThrottle,
}

impl<T, P, I> Session<T, P, I>
where
    T: MeterTransport,
    P: Publisher,
    I: PulseInput,
{
    /// Create a session in state `Login`. Time zero is "now" for
    /// [`now_ms`](Self::now_ms); callers driving [`poll`](Self::poll) with
    /// their own clock should start it at zero as well.
    pub fn new(transport: T, publisher: P, pulse: I, config: SessionConfig) -> Result<Self, IecError> {
        config.validate()?;
        Ok(Session {
            transport,
            publisher,
            pulse,
            assembler: FrameAssembler::new(config.rx_capacity),
            last_request: Vec::new(),
            config,
            state: State::Login,
            retry_state: State::Login,
            state_since: 0,
            not_before: 0,
            started_at: 0,
            last_publish: 0,
            epoch: Instant::now(),
            identification: None,
            values: ValueTable::new(),
            gauge: EnergyGauge::new(),
            stats: SessionStats::default(),
            bcc_throttle: LogThrottle::new(60_000, 5),
        })
    }

    /// Milliseconds since the session was created.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn identification(&self) -> Option<&Identification> {
        self.identification.as_ref()
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn gauge(&self) -> &EnergyGauge {
        &self.gauge
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    fn transition(&mut self, next: State, now: u64) {
        trace!("{} -> {next}", self.state);
        self.state = next;
        self.state_since = now;
    }

    /// Drop everything in flight and start over with a fresh sign-on.
    pub fn force_restart(&mut self, now: u64) {
        if !self.assembler.is_empty() {
            debug!("Dropping partial frame in {}", self.state);
        }
        self.assembler.clear();
        self.retry_state = State::Login;
        self.not_before = now;
        self.transition(State::Login, now);
    }

    fn watchdog_expired(&self, now: u64) -> bool {
        self.state != State::Sleep
            && now.saturating_sub(self.state_since) > self.config.stall_timeout_ms
    }

    /// Advance the protocol by at most one step.
    ///
    /// Only transport and publisher I/O errors are returned; protocol
    /// trouble (bad checksums, NAKs, stalls) is handled internally.
    pub async fn poll(&mut self, now: u64) -> Result<(), IecError> {
        if self.watchdog_expired(now) {
            warn!("{}, signing on again", IecError::ProtocolStall(self.state.to_string()));
            self.stats.watchdog_restarts += 1;
            self.force_restart(now);
            return Ok(());
        }

        match self.state {
            state if state.is_awaiting() => self.receive(now).await,
            State::MaybePublish => {
                self.publish_if_due(now).await?;
                self.not_before = now + self.config.sleep_ms;
                self.transition(State::Sleep, now);
                Ok(())
            }
            State::Sleep => {
                self.sleep(now);
                Ok(())
            }
            _ if now < self.not_before => Ok(()),
            _ => self.enter(now).await,
        }
    }

    fn sleep(&mut self, now: u64) {
        if self.pulse.pulse_observed() {
            let wake = now + self.config.pulse_settle_ms;
            if wake < self.not_before {
                debug!("Pulse seen, polling in {} ms", self.config.pulse_settle_ms);
                self.not_before = wake;
            }
        }
        if now >= self.not_before {
            self.transition(State::RequestRegister(0), now);
        }
    }

    /// Write `request` and wait for the answer in `next`.
    async fn send(&mut self, request: &[u8], mode: AssemblerMode, next: State, now: u64) -> Result<(), IecError> {
        self.assembler.expect(mode);
        self.transport.write(request).await?;
        self.last_request = request.to_vec();
        self.retry_state = self.state;
        self.transition(next, now);
        Ok(())
    }

    /// Entry actions of the request states.
    async fn enter(&mut self, now: u64) -> Result<(), IecError> {
        match self.state {
            State::Login | State::Login2 => {
                self.transport.set_baud_rate(self.config.initial_baud).await?;
                let next = if self.state == State::Login {
                    State::AwaitIdentification
                } else {
                    State::AwaitIdentification2
                };
                self.send(&frame::login_request(), AssemblerMode::Line, next, now).await
            }
            State::RequestDataMode | State::RequestProgramMode => {
                let (mode, next) = if self.state == State::RequestDataMode {
                    (IEC_MODE_READOUT, State::AwaitReadout)
                } else {
                    (IEC_MODE_PROGRAMMING, State::AwaitProgramAck)
                };
                let request = frame::option_select(IEC_PROTOCOL_NORMAL, IEC_BAUD_ID_9600, mode);
                self.send(&request, AssemblerMode::Block, next, now).await?;
                self.transport.set_baud_rate(self.config.upgraded_baud).await
            }
            State::Restart => {
                let request = frame::break_request();
                self.transport.write(&request).await?;
                self.last_request = request.to_vec();
                self.retry_state = State::Restart;
                self.not_before = now + self.config.turnaround_ms;
                self.transition(State::Login2, now);
                Ok(())
            }
            State::RequestRegister(i) => match self.config.registers.get(i).copied() {
                Some(id) => {
                    let request = frame::program_read_request(id.code());
                    self.send(&request, AssemblerMode::Block, State::AwaitRegister(i), now).await
                }
                None => {
                    self.transition(State::MaybePublish, now);
                    Ok(())
                }
            },
            other => {
                debug!("No entry action for {other}");
                Ok(())
            }
        }
    }

    /// Read until one frame completes or no bytes are left.
    async fn receive(&mut self, now: u64) -> Result<(), IecError> {
        while self.transport.bytes_available()? > 0 {
            let Some(byte) = self.transport.read_byte().await? else {
                break;
            };
            if let Some(event) = self.assembler.push(byte) {
                self.not_before = now + self.config.turnaround_ms;
                return self.handle_event(event, now).await;
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: AssemblerEvent, now: u64) -> Result<(), IecError> {
        match event {
            AssemblerEvent::Nak => {
                self.stats.naks += 1;
                warn!("{} in {}, retrying {}", IecError::ProtocolNak, self.state, self.retry_state);
                self.transition(self.retry_state, now);
                Ok(())
            }
            AssemblerEvent::Overflow(dropped) => {
                self.stats.overflows += 1;
                warn!("{} in {}", IecError::FramingOverflow(dropped), self.state);
                Ok(())
            }
            AssemblerEvent::Line(line) => {
                log_frame("rx", &line);
                self.handle_identification(&line, now);
                Ok(())
            }
            AssemblerEvent::Block(block) => {
                log_frame("rx", &block);
                if block == self.last_request {
                    debug!("Ignoring echo of our request in {}", self.state);
                    return Ok(());
                }
                if let Err(e) = frame::checksum(&block) {
                    self.stats.checksum_errors += 1;
                    if self.bcc_throttle.allow() {
                        warn!("{} in {}, frame dropped", IecError::from(e), self.state);
                    }
                    return Ok(());
                }
                self.stats.frames_ok += 1;
                self.handle_block(&block, now).await
            }
        }
    }

    fn handle_identification(&mut self, line: &[u8], now: u64) {
        let ident = match Identification::parse(line) {
            Ok(ident) => ident,
            Err(e) => {
                // Includes the echoed sign-on of half-duplex heads.
                debug!("Ignoring line {}: {e}", format_iec(line));
                return;
            }
        };

        let upgrade = ident.is_upgradeable();
        if self.identification.as_ref() != Some(&ident) {
            info!(
                "Meter {ident} (up to {} baud)",
                ident.max_baud().map_or_else(|| "?".to_string(), |b| b.to_string())
            );
        }
        self.identification = Some(ident);

        let next = match (self.state, upgrade) {
            (State::AwaitIdentification, true) => State::RequestDataMode,
            (State::AwaitIdentification2, true) => State::RequestProgramMode,
            (_, false) => {
                self.assembler.expect(AssemblerMode::Block);
                State::ReadoutSlow
            }
            (other, true) => {
                debug!("Identification ignored in {other}");
                return;
            }
        };
        self.transition(next, now);
    }

    async fn handle_block(&mut self, block: &[u8], now: u64) -> Result<(), IecError> {
        match self.state {
            State::AwaitReadout | State::ReadoutSlow => {
                let payload = frame::block_payload(block).unwrap_or_default();
                self.values = parse_readout(payload);
                self.stats.readouts += 1;
                debug!("Readout: {:?}", self.values);
                self.feed_gauge(now);
                if self.state == State::ReadoutSlow {
                    self.publish_if_due(now).await?;
                }
                self.transition(State::Restart, now);
            }
            State::AwaitProgramAck => {
                if frame::is_program_ack(block) {
                    self.transition(State::RequestRegister(0), now);
                } else {
                    debug!("Unexpected answer to program mode: {}", format_iec(block));
                    self.transition(State::RequestProgramMode, now);
                }
            }
            State::AwaitRegister(i) => {
                self.handle_register(i, block, now);
                let next = if i + 1 < self.config.registers.len() {
                    State::RequestRegister(i + 1)
                } else {
                    State::MaybePublish
                };
                self.transition(next, now);
            }
            other => debug!("Block ignored in {other}"),
        }
        Ok(())
    }

    fn handle_register(&mut self, index: usize, block: &[u8], now: u64) {
        let Some(&id) = self.config.registers.get(index) else {
            return;
        };
        let payload = frame::block_payload(block).unwrap_or_default();
        let text = String::from_utf8_lossy(payload);

        let Some((code, raw)) = split_register_response(&text) else {
            warn!("{}", IecError::ValueParseError(format!("{id}: {}", format_iec(payload))));
            return;
        };
        if let Some(code) = code {
            if RegisterId::from_code(code) != Some(id) {
                warn!("{} in answer to {id}", IecError::UnrecognizedRegister(code.to_string()));
                return;
            }
        }

        match parse_value(raw) {
            Some(value) => {
                self.values.set(id, value);
                if id.is_energy() {
                    self.feed_gauge(now);
                }
            }
            None => warn!("{}", IecError::ValueParseError(format!("{id}: {raw:?}"))),
        }
    }

    fn feed_gauge(&mut self, now: u64) {
        if let Some(wh) = self.values.try_get(RegisterId::PositiveEnergy) {
            self.gauge.feed_positive(now, wh);
        }
        if let Some(wh) = self.values.try_get(RegisterId::NegativeEnergy) {
            self.gauge.feed_negative(now, wh);
        }
    }

    fn snapshot(&self, reason: PublishReason, now: u64) -> Snapshot {
        let extremes = self.pulse.extremes();
        Snapshot {
            timestamp: chrono::Utc::now(),
            device: self
                .identification
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            positive_wh: self.gauge.positive_total(),
            negative_wh: self.gauge.negative_total(),
            power_watt: self.gauge.instantaneous_power(),
            reason,
            diagnostics: Diagnostics {
                uptime_s: now.saturating_sub(self.started_at) / 1000,
                pulse_min: extremes.map(|(lo, _)| lo),
                pulse_max: extremes.map(|(_, hi)| hi),
                stats: self.stats,
            },
        }
    }

    /// Publish and reset the estimator when the policy says so.
    async fn publish_if_due(&mut self, now: u64) -> Result<(), IecError> {
        let elapsed = now.saturating_sub(self.last_publish);
        let power = self.gauge.instantaneous_power();
        let Some(reason) = publish_reason(elapsed, power, self.gauge.is_significant_change()) else {
            return Ok(());
        };

        self.stats.publishes += 1;
        let snapshot = self.snapshot(reason, now);
        if let Err(e) = self.publisher.publish(&snapshot).await {
            self.stats.publishes -= 1;
            return Err(e);
        }

        info!("Published {power} W ({reason:?}), stats {:?}", self.stats);
        self.gauge.reset();
        self.last_publish = now;
        Ok(())
    }

    /// Give the publisher a chance to service its connection.
    pub async fn keep_alive(&mut self) -> Result<(), IecError> {
        self.publisher.keep_alive().await
    }
}

/// Drive `session` forever, polling every `tick`.
///
/// Errors never end the loop: they are logged, the session signs on again
/// after a short pause.
pub async fn run_forever<T, P, I>(session: &mut Session<T, P, I>, tick: Duration)
where
    T: MeterTransport,
    P: Publisher,
    I: PulseInput,
{
    info!("Session started, polling {:?}", session.config().registers);
    loop {
        let now = session.now_ms();
        if let Err(e) = session.poll(now).await {
            error!("{e} in {}, restarting", session.state());
            session.force_restart(now);
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
        if let Err(e) = session.keep_alive().await {
            warn!("Publisher keep-alive failed: {e}");
        }
        tokio::time::sleep(tick).await;
    }
}

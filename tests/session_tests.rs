//! End-to-end tests of the Mode C session against a scripted mock meter.

use iec21_rs::constants::{IEC_STALL_TIMEOUT_MS, NAK};
use iec21_rs::iec::frame::{
    break_request, data_block, login_request, option_select, program_ack, program_read_request,
};
use iec21_rs::iec::serial_mock::PortEvent;
use iec21_rs::iec::{MockMeterPort, NoPulseInput, PulseInput, Session, SessionConfig, State};
use iec21_rs::publisher::{MemoryPublisher, PublishReason};
use iec21_rs::RegisterId;

const IDENT: &[u8] = b"/ISk5ME162-0001\r\n";
const READOUT: &[u8] = b"C.1.0(28342193)\r\n1.8.0(0032826.545*kWh)\r\n2.8.0(0000000.001*kWh)\r\n!\r\n";

/// Mock meter that offers the 9600 baud upgrade and answers every request.
fn upgradeable_meter() -> MockMeterPort {
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), IDENT);
    port.respond_to(&option_select(b'0', b'5', b'0'), &data_block(READOUT));
    port.respond_to(&option_select(b'0', b'5', b'1'), &program_ack());
    port.respond_to(
        &program_read_request("1.8.0"),
        &data_block(b"1.8.0(0032826.545*kWh)"),
    );
    port.respond_to(
        &program_read_request("2.8.0"),
        &data_block(b"2.8.0(0000000.001*kWh)"),
    );
    port
}

/// Poll every 10 ms from `from` to `to` inclusive.
async fn drive<I: PulseInput>(
    session: &mut Session<MockMeterPort, MemoryPublisher, I>,
    from: u64,
    to: u64,
) {
    let mut now = from;
    while now <= to {
        session.poll(now).await.unwrap();
        now += 10;
    }
}

fn session(
    port: &MockMeterPort,
    publisher: &MemoryPublisher,
) -> Session<MockMeterPort, MemoryPublisher, NoPulseInput> {
    Session::new(
        port.clone(),
        publisher.clone(),
        NoPulseInput,
        SessionConfig::default(),
    )
    .unwrap()
}

/// Tests the whole handshake: readout, restart, programming mode and
/// register polling, with the speed switches in the right places.
#[tokio::test]
async fn test_full_handshake() {
    let port = upgradeable_meter();
    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);

    drive(&mut s, 0, 200).await;
    assert_eq!(s.state(), State::Sleep);

    assert_eq!(
        port.events(),
        vec![
            PortEvent::Write(login_request().to_vec()),
            PortEvent::Write(option_select(b'0', b'5', b'0').to_vec()),
            PortEvent::Baud(9600),
            PortEvent::Write(break_request().to_vec()),
            PortEvent::Baud(300),
            PortEvent::Write(login_request().to_vec()),
            PortEvent::Write(option_select(b'0', b'5', b'1').to_vec()),
            PortEvent::Baud(9600),
            PortEvent::Write(program_read_request("1.8.0").to_vec()),
            PortEvent::Write(program_read_request("2.8.0").to_vec()),
        ]
    );

    let ident = s.identification().unwrap();
    assert_eq!(ident.manufacturer, "ISk");
    assert_eq!(ident.ident, "ME162-0001");
    assert_eq!(s.values().get(RegisterId::SerialNumber), 28_342_193);
    assert_eq!(s.values().get(RegisterId::PositiveEnergy), 32_826_545);
    assert_eq!(s.values().get(RegisterId::NegativeEnergy), 1);
    assert_eq!(s.stats().frames_ok, 4);
    assert_eq!(s.stats().readouts, 1);
    assert!(publisher.snapshots().is_empty());
}

/// Tests that after sleeping the session polls the registers again without
/// a new sign-on.
#[tokio::test]
async fn test_register_polling_repeats() {
    let port = upgradeable_meter();
    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);

    drive(&mut s, 0, 5_000).await;
    let reads = port
        .writes()
        .iter()
        .filter(|w| **w == program_read_request("1.8.0").to_vec())
        .count();
    assert!(reads >= 2);
    assert_eq!(port.writes().iter().filter(|w| **w == login_request().to_vec()).count(), 2);
}

/// Tests that the heartbeat publishes a snapshot of the totals.
#[tokio::test]
async fn test_heartbeat_publish() {
    let port = upgradeable_meter();
    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);

    drive(&mut s, 0, 125_000).await;

    let snapshots = publisher.snapshots();
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.reason, PublishReason::Heartbeat);
    assert_eq!(snapshot.device, "ISk5ME162-0001");
    assert_eq!(snapshot.positive_wh, 32_826_545);
    assert_eq!(snapshot.negative_wh, 1);
    assert_eq!(snapshot.power_watt, 0);
    assert!(snapshot.diagnostics.uptime_s >= 120);
    assert_eq!(s.stats().publishes, 1);
    assert_eq!(s.stats().watchdog_restarts, 0);
}

/// Tests that a NAK leads to the same request being sent again.
#[tokio::test]
async fn test_nak_retransmits() {
    let program_mode = option_select(b'0', b'5', b'1');
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), IDENT);
    port.respond_to(&option_select(b'0', b'5', b'0'), &data_block(READOUT));
    port.respond_to(&program_mode, &[NAK]);
    port.respond_to(&program_mode, &program_ack());
    port.respond_to(&program_read_request("1.8.0"), &data_block(b"(0032826.545*kWh)"));
    port.respond_to(&program_read_request("2.8.0"), &data_block(b"(0000000.001*kWh)"));

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 300).await;

    let sent = port.writes().iter().filter(|w| **w == program_mode.to_vec()).count();
    assert_eq!(sent, 2);
    assert_eq!(s.stats().naks, 1);
    assert_eq!(s.state(), State::Sleep);
    assert_eq!(s.values().get(RegisterId::PositiveEnergy), 32_826_545);
}

/// Tests that a silent meter trips the watchdog and gets a new sign-on.
#[tokio::test]
async fn test_watchdog_on_silent_meter() {
    let port = MockMeterPort::new();
    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);

    s.poll(0).await.unwrap();
    assert_eq!(s.state(), State::AwaitIdentification);
    s.poll(IEC_STALL_TIMEOUT_MS + 1).await.unwrap();
    assert_eq!(s.state(), State::Login);
    s.poll(IEC_STALL_TIMEOUT_MS + 2).await.unwrap();
    assert_eq!(s.state(), State::AwaitIdentification);

    assert_eq!(port.writes(), vec![login_request().to_vec(); 2]);
    assert_eq!(s.stats().watchdog_restarts, 1);
}

/// Tests that a meter without the upgrade stays at 300 baud and is read
/// through its data readouts, which also drive publishing.
#[tokio::test]
async fn test_readout_only_meter() {
    let port = MockMeterPort::new();
    let mut reply = b"/ABC4XYZ123\r\n".to_vec();
    reply.extend_from_slice(&data_block(READOUT));
    port.respond_to(&login_request(), &reply);

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 121_000).await;

    assert!(port.events().iter().all(|e| !matches!(e, PortEvent::Baud(_))));
    assert!(port
        .writes()
        .iter()
        .all(|w| *w == login_request().to_vec() || *w == break_request().to_vec()));
    assert!(s.stats().readouts > 2);
    assert_eq!(s.values().get(RegisterId::PositiveEnergy), 32_826_545);
    assert_eq!(publisher.snapshots().len(), 1);
}

/// Fires once, the first time it is sampled.
struct OnePulse(bool);

impl PulseInput for OnePulse {
    fn pulse_observed(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }
}

/// Tests that a pulse shortens the sleep to the settle delay.
#[tokio::test]
async fn test_pulse_cuts_sleep_short() {
    let port = upgradeable_meter();
    let publisher = MemoryPublisher::new();
    let mut s = Session::new(
        port.clone(),
        publisher.clone(),
        OnePulse(false),
        SessionConfig::default(),
    )
    .unwrap();

    // Sleep starts at 190 ms; the pulse is seen at 200 ms.
    drive(&mut s, 0, 1_300).await;
    let reads = port
        .writes()
        .iter()
        .filter(|w| **w == program_read_request("1.8.0").to_vec())
        .count();
    assert_eq!(reads, 2);
}

/// Tests that a response for a different register is not stored.
#[tokio::test]
async fn test_mismatched_register_dropped() {
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), IDENT);
    port.respond_to(&option_select(b'0', b'5', b'0'), &data_block(b"!\r\n"));
    port.respond_to(&option_select(b'0', b'5', b'1'), &program_ack());
    port.respond_to(&program_read_request("1.8.0"), &data_block(b"2.8.0(0000005.000*kWh)"));
    port.respond_to(&program_read_request("2.8.0"), &data_block(b"2.8.0(0000000.002*kWh)"));

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 200).await;

    assert_eq!(s.state(), State::Sleep);
    assert!(!s.values().contains(RegisterId::PositiveEnergy));
    assert_eq!(s.values().get(RegisterId::NegativeEnergy), 2);
}

/// Tests that a valid block other than the ack sends programming mode again.
#[tokio::test]
async fn test_invalid_program_ack_resends() {
    let program_mode = option_select(b'0', b'5', b'1');
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), IDENT);
    port.respond_to(&option_select(b'0', b'5', b'0'), &data_block(READOUT));
    port.respond_to(&program_mode, &data_block(b"(ERROR)"));
    port.respond_to(&program_mode, &program_ack());
    port.respond_to(&program_read_request("1.8.0"), &data_block(b"(0032826.545*kWh)"));
    port.respond_to(&program_read_request("2.8.0"), &data_block(b"(0000000.001*kWh)"));

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 300).await;

    let sent = port.writes().iter().filter(|w| **w == program_mode.to_vec()).count();
    assert_eq!(sent, 2);
    assert_eq!(s.stats().naks, 0);
    assert_eq!(s.state(), State::Sleep);
}

/// Tests that a runaway reply is dropped once and the watchdog signs on again.
#[tokio::test]
async fn test_overflow_recovers_via_watchdog() {
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), &[b'x'; 2_000]);

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 100).await;
    assert_eq!(s.state(), State::AwaitIdentification);
    assert_eq!(s.stats().overflows, 1);
    assert_eq!(port.pending_rx(), 0);

    s.poll(IEC_STALL_TIMEOUT_MS + 1).await.unwrap();
    assert_eq!(s.state(), State::Login);
    assert_eq!(s.stats().watchdog_restarts, 1);
    s.poll(IEC_STALL_TIMEOUT_MS + 2).await.unwrap();
    assert_eq!(s.state(), State::AwaitIdentification);
    assert_eq!(port.writes(), vec![login_request().to_vec(); 2]);
}

/// Tests that an echo of the register request is not taken as the answer.
#[tokio::test]
async fn test_echoed_register_request_ignored() {
    let port = MockMeterPort::new();
    port.respond_to(&login_request(), IDENT);
    port.respond_to(&option_select(b'0', b'5', b'0'), &data_block(b"!\r\n"));
    port.respond_to(&option_select(b'0', b'5', b'1'), &program_ack());
    let mut echoed = program_read_request("1.8.0").to_vec();
    echoed.extend_from_slice(&data_block(b"1.8.0(0000123.456*kWh)"));
    port.respond_to(&program_read_request("1.8.0"), &echoed);
    port.respond_to(&program_read_request("2.8.0"), &data_block(b"2.8.0(0000000.002*kWh)"));

    let publisher = MemoryPublisher::new();
    let mut s = session(&port, &publisher);
    drive(&mut s, 0, 300).await;

    assert_eq!(s.state(), State::Sleep);
    assert_eq!(s.values().get(RegisterId::PositiveEnergy), 123_456);
    assert_eq!(s.values().get(RegisterId::NegativeEnergy), 2);
}

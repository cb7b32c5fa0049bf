#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end session tests against a simulated strap.
//!
//! Each test wires a [`Session`] to a [`SimulatedStrap`] over in-memory channels, so the
//! handshake, dispatcher task and download loop all run concurrently the way they do on a
//! real link.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use whoop_protocol::config::SessionConfig;
use whoop_protocol::core::constants::CommandNumber;
use whoop_protocol::error::{DownloadError, ProtocolError};
use whoop_protocol::protocol::history::DownloadReport;
use whoop_protocol::service::session::SessionState;
use whoop_protocol::transport::crypto::AesCmac;
use whoop_protocol::transport::memory::{
    HistorySegment, MemoryTransport, SimulatedStrap, StaticDeviceInfo, StrapLogHandle,
};
use whoop_protocol::transport::presentation::DeviceEvent;
use whoop_protocol::transport::sink::{shared, ByteSink, MemorySink};
use whoop_protocol::Session;

const SERIAL: &str = "4A1234567";

struct Harness {
    session: Session<MemoryTransport, StaticDeviceInfo>,
    sink: MemorySink,
    events: UnboundedReceiver<DeviceEvent>,
    strap: StrapLogHandle,
    dispatcher: JoinHandle<()>,
}

fn harness(strap: SimulatedStrap) -> Harness {
    let (transport, wire) = MemoryTransport::new();
    let sink = MemorySink::new();
    let (events_tx, events) = mpsc::unbounded_channel();

    let session = Session::with_parts(
        transport,
        StaticDeviceInfo::new(SERIAL),
        AesCmac,
        shared(sink.clone()),
        Arc::new(events_tx),
        SessionConfig::default(),
    );

    let (inbound, dispatcher) = session.attach_channel();
    let log = strap.log();
    strap.spawn(wire, inbound);

    Harness {
        session,
        sink,
        events,
        strap: log,
        dispatcher,
    }
}

async fn expect_event(
    events: &mut UnboundedReceiver<DeviceEvent>,
    wanted: impl Fn(&DeviceEvent) -> bool,
) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(event) if wanted(&event) => return event,
                Some(_) => continue,
                None => panic!("presenter channel closed"),
            }
        }
    })
    .await
    .expect("event not presented in time")
}

fn segments() -> Vec<HistorySegment> {
    vec![
        HistorySegment::heart_rate(1_700_000_000, 5, 1000),
        HistorySegment::heart_rate(1_700_000_005, 3, 1008),
    ]
}

#[tokio::test]
async fn test_connect_presents_device_status() {
    let mut h = harness(SimulatedStrap::new(SERIAL).with_battery(875).with_status(true, false));

    h.session.connect().await.expect("connect should succeed");
    assert_eq!(h.session.state(), SessionState::Ready);

    let battery = expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Battery { .. })).await;
    assert_eq!(battery, DeviceEvent::Battery { percent: 87.5 });

    let version = expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Version { .. })).await;
    assert_eq!(
        version,
        DeviceEvent::Version {
            harvard: "41.16.6.0".into(),
            boylston: "17.2.2.0".into(),
        }
    );

    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Charging(_))).await,
        DeviceEvent::Charging(true)
    );
    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Wrist(_))).await,
        DeviceEvent::Wrist(false)
    );

    let log = h.strap.snapshot();
    assert_eq!(log.authenticated, Some(true));
    assert_eq!(
        &log.commands[..2],
        &[
            CommandNumber::StartSession.code(),
            CommandNumber::SessionResponse.code()
        ]
    );
}

#[tokio::test]
async fn test_realtime_heart_rate_streams_after_toggle() {
    let mut h = harness(SimulatedStrap::new(SERIAL));
    h.session.connect().await.unwrap();

    assert!(h.session.toggle_realtime_hr().await.unwrap());
    assert!(h.session.is_realtime_active());

    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::RealtimeHr(_))).await,
        DeviceEvent::RealtimeHr(true)
    );
    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::HeartRate(_))).await,
        DeviceEvent::HeartRate(64)
    );
}

#[tokio::test]
async fn test_clock_request_presents_strap_time() {
    let mut h = harness(SimulatedStrap::new(SERIAL).with_clock(1_712_345_678));
    h.session.connect().await.unwrap();

    h.session.get_clock().await.unwrap();
    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Clock { .. })).await,
        DeviceEvent::Clock { unix: 1_712_345_678 }
    );
}

#[tokio::test]
async fn test_download_history_to_sink() {
    let segments = segments();
    let expected: Vec<u8> = segments
        .iter()
        .flat_map(|s| &s.frames)
        .flat_map(|f| f.encode().unwrap())
        .collect();

    let mut h = harness(SimulatedStrap::new(SERIAL).with_segments(segments));
    h.session.connect().await.unwrap();

    let report = h.session.download_history().await.unwrap();
    assert_eq!(
        report,
        DownloadReport {
            segments: 2,
            last_trim: 1008
        }
    );
    assert!(!h.session.is_downloading());
    assert_eq!(h.sink.contents(), expected);
    assert!(!h.sink.is_open());

    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Notice(_))).await,
        DeviceEvent::Notice("History Download Success!".into())
    );

    let acks = h.strap.snapshot().acks;
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0][1..5], 1000u32.to_le_bytes());
    assert_eq!(acks[1][1..5], 1008u32.to_le_bytes());

    let snapshot = h.session.metrics().snapshot();
    assert_eq!(snapshot.downloads_success, 1);
    assert_eq!(snapshot.history_frames_dropped, 0);
}

#[tokio::test]
async fn test_concurrent_download_is_rejected() {
    let mut h = harness(SimulatedStrap::new(SERIAL).with_segments(segments()));
    h.session.connect().await.unwrap();

    let (first, second) = tokio::join!(h.session.download_history(), h.session.download_history());

    assert_eq!(first.unwrap().segments, 2);
    assert!(matches!(
        second,
        Err(ProtocolError::Download(DownloadError::AlreadyActive))
    ));

    // Only the completed download reports back; the rejected one stays silent.
    let mut notices = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        if let DeviceEvent::Notice(text) = event {
            notices.push(text);
        }
    }
    assert_eq!(notices, vec!["History Download Success!".to_string()]);
    assert_eq!(h.session.metrics().snapshot().downloads_total, 1);
}

#[tokio::test]
async fn test_link_loss_during_download() {
    let mut h = harness(
        SimulatedStrap::new(SERIAL)
            .with_segments(segments())
            .hang_up_on(CommandNumber::HistoricalDataResult),
    );
    h.session.connect().await.unwrap();

    let result = h.session.download_history().await;
    assert!(matches!(
        result,
        Err(ProtocolError::Download(DownloadError::LinkLost))
    ));
    assert!(!h.sink.is_open());
    assert!(!h.session.is_downloading());

    assert_eq!(
        expect_event(&mut h.events, |e| matches!(e, DeviceEvent::Notice(_))).await,
        DeviceEvent::Notice("History Download Error!".into())
    );

    tokio::time::timeout(Duration::from_secs(5), h.dispatcher)
        .await
        .expect("dispatcher should stop when the link drops")
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(matches!(
        h.session.request_battery_level().await,
        Err(ProtocolError::NotConnected)
    ));
}

#[tokio::test]
async fn test_disconnect_resets_session() {
    let h = harness(SimulatedStrap::new(SERIAL));
    h.session.connect().await.unwrap();
    h.session.toggle_realtime_hr().await.unwrap();

    h.session.disconnect();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.session.is_realtime_active());
    assert!(matches!(
        h.session.download_history().await,
        Err(ProtocolError::NotConnected)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_sessions_run_in_parallel() {
    let mut tasks = Vec::new();

    for i in 0..8u32 {
        tasks.push(tokio::spawn(async move {
            let trim = 100 * (i + 1);
            let segment = HistorySegment::heart_rate(1_700_000_000 + i, 2 + i as usize, trim);
            let expected: Vec<u8> = segment
                .frames
                .iter()
                .flat_map(|f| f.encode().unwrap())
                .collect();

            let h = harness(SimulatedStrap::new(SERIAL).with_segments(vec![segment]));
            h.session.connect().await.unwrap();
            let report = h.session.download_history().await.unwrap();

            assert_eq!(report.last_trim, trim);
            assert_eq!(h.sink.contents(), expected);
        }));
    }

    for task in tasks {
        task.await.expect("session task panicked");
    }
}

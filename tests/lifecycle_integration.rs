//! Lifecycle tests: full runs from a frame source to a shutdown summary.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use airtrack::capture::{FileSource, ReplaySource};
use airtrack::publish::{Endpoint, EventPublisher, RecordingSink};
use airtrack::{
    LifecycleController, LifecycleState, MonitorConfig, PresenceEvent, ShutdownReason,
};
use common::{FrameBuilder, mac};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn config(period_ms: u64, max_age: u32) -> MonitorConfig {
    MonitorConfig::default()
        .with_eviction_period(Duration::from_millis(period_ms))
        .with_max_age(max_age)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

/// Writes a microsecond-resolution pcap with radiotap link type.
fn write_pcap(frames: &[(u32, Vec<u8>)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut header = Vec::new();
    header.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&4u16.to_le_bytes());
    header.extend_from_slice(&0i32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&65_535u32.to_le_bytes());
    header.extend_from_slice(&127u32.to_le_bytes());
    file.write_all(&header).unwrap();

    for (secs, data) in frames {
        let len = u32::try_from(data.len()).unwrap();
        let mut record = Vec::new();
        record.extend_from_slice(&secs.to_le_bytes());
        record.extend_from_slice(&250_000u32.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(data);
        file.write_all(&record).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Writes a pcapng with one interface per link type; packets name their
/// interface index.
fn write_pcapng(linktypes: &[u16], packets: &[(u32, u64, Vec<u8>)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&0x0a0d_0d0au32.to_le_bytes());
    bytes.extend_from_slice(&28u32.to_le_bytes());
    bytes.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&(-1i64).to_le_bytes());
    bytes.extend_from_slice(&28u32.to_le_bytes());

    for linktype in linktypes {
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(&linktype.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&65_535u32.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
    }

    for (if_id, micros, data) in packets {
        let caplen = u32::try_from(data.len()).unwrap();
        let padded = data.len().div_ceil(4) * 4;
        let total = u32::try_from(32 + padded).unwrap();
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(&total.to_le_bytes());
        bytes.extend_from_slice(&if_id.to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(micros >> 32).unwrap().to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(micros & 0xffff_ffff).unwrap().to_le_bytes());
        bytes.extend_from_slice(&caplen.to_le_bytes());
        bytes.extend_from_slice(&caplen.to_le_bytes());
        bytes.extend_from_slice(data);
        bytes.resize(bytes.len() + padded - data.len(), 0);
        bytes.extend_from_slice(&total.to_le_bytes());
    }

    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_pcapng_frames_on_foreign_link_type_are_ignored() {
    let pcapng = write_pcapng(
        &[1, 127],
        &[
            (0, 1_700_000_000_000_000, FrameBuilder::beacon(mac(2), "wired").build()),
            (1, 1_700_000_001_000_000, FrameBuilder::beacon(mac(1), "office").build()),
        ],
    );
    let sink = Arc::new(RecordingSink::new());
    let controller = LifecycleController::new(config(60_000, 4), sink).unwrap();

    controller
        .start(Box::new(FileSource::open(pcapng.path()).unwrap()))
        .unwrap();
    let summary = controller.wait().unwrap();

    assert_eq!(summary.reason, ShutdownReason::SourceExhausted);
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.frames_ignored, 1);
    assert_eq!(summary.access_points.len, 1);
    assert!(controller.access_points().contains(&mac(1)));
    assert!(!controller.access_points().contains(&mac(2)));
}

#[test]
fn test_pcap_replay_runs_to_completion() {
    let pcap = write_pcap(&[
        (1_700_000_000, FrameBuilder::beacon(mac(1), "office").build()),
        (1_700_000_001, FrameBuilder::probe_request(mac(20), Some("home")).build()),
        (1_700_000_002, FrameBuilder::data_to_ds(mac(21), mac(1)).build()),
        (1_700_000_003, FrameBuilder::ack(mac(1)).build()),
        (1_700_000_004, vec![0, 0, 4]),
    ]);
    let sink = Arc::new(RecordingSink::new());
    let controller = LifecycleController::new(config(60_000, 4), sink.clone()).unwrap();

    controller
        .start(Box::new(FileSource::open(pcap.path()).unwrap()))
        .unwrap();
    let summary = controller.wait().unwrap();

    assert_eq!(summary.reason, ShutdownReason::SourceExhausted);
    assert!(!summary.source_live);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.frames_processed, 5);
    assert_eq!(summary.frames_ignored, 2);
    assert_eq!(summary.clients.len, 2);
    assert_eq!(summary.access_points.len, 1);
    assert_eq!(summary.clients.added, 2);
    assert_eq!(controller.state(), LifecycleState::Terminated);

    // Sightings carry the capture timestamps from the file.
    let client = controller.clients().get(&mac(20)).unwrap();
    assert_eq!(client.first_seen.timestamp(), 1_700_000_001);
    assert_eq!(client.first_seen.timestamp_subsec_micros(), 250_000);

    assert_eq!(sink.len(), 3);
    assert!(sink.is_closed());
}

#[test]
fn test_live_source_running_dry_exits_non_zero() {
    let sink = Arc::new(RecordingSink::new());
    let controller = LifecycleController::new(config(60_000, 4), sink).unwrap();
    let source = ReplaySource::new(vec![FrameBuilder::beacon(mac(1), "x").at(0)]).as_live();

    controller.start(Box::new(source)).unwrap();
    let summary = controller.wait().unwrap();

    assert_eq!(summary.reason, ShutdownReason::SourceExhausted);
    assert!(summary.source_live);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn test_signal_shutdown_exits_zero() {
    let sink = Arc::new(RecordingSink::new());
    let controller = LifecycleController::new(config(60_000, 4), sink).unwrap();
    let source = ReplaySource::new(Vec::new())
        .as_live()
        .hold_open(Duration::from_millis(5));
    controller.start(Box::new(source)).unwrap();

    let trigger = controller.trigger();
    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        trigger.request(ShutdownReason::Signal)
    });

    let summary = controller.wait().unwrap();
    assert!(signaller.join().unwrap());
    assert_eq!(summary.reason, ShutdownReason::Signal);
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn test_back_to_back_triggers_drain_once() {
    let sink = Arc::new(RecordingSink::new());
    let controller = Arc::new(LifecycleController::new(config(10, 4), sink).unwrap());
    let source = ReplaySource::new(Vec::new()).hold_open(Duration::from_millis(2));
    controller.start(Box::new(source)).unwrap();

    let trigger = controller.trigger();
    assert!(trigger.request(ShutdownReason::Signal));
    assert!(!trigger.request(ShutdownReason::Signal));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.wait())
        })
        .collect();
    let summaries: Vec<_> = waiters
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].reason, ShutdownReason::Signal);
    assert!(controller.wait().is_none());
}

#[test]
fn test_eviction_thread_reports_losses() {
    let sink = Arc::new(RecordingSink::new());
    let controller = LifecycleController::new(config(10, 0), sink.clone()).unwrap();
    let source = ReplaySource::new(vec![
        FrameBuilder::beacon(mac(1), "office").at(0),
        FrameBuilder::probe_request(mac(20), None).at(0),
    ])
    .hold_open(Duration::from_millis(2));
    controller.start(Box::new(source)).unwrap();

    let lost_both = wait_until(Duration::from_secs(5), || {
        sink.events().iter().filter(|e| !e.is_discovery()).count() == 2
    });
    let summary = controller.shutdown(ShutdownReason::Signal).unwrap();

    assert!(lost_both, "events: {:?}", sink.events());
    assert_eq!(summary.clients.len, 0);
    assert_eq!(summary.access_points.len, 0);
    assert_eq!(summary.clients.removed, 1);
    assert_eq!(summary.access_points.removed, 1);
}

#[test]
fn test_subscriber_receives_discovery_from_replay() {
    let publisher = EventPublisher::bind(&Endpoint::parse("tcp://127.0.0.1:*").unwrap(), 64).unwrap();
    let stream = TcpStream::connect(publisher.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let publisher = Arc::new(publisher);
    assert!(wait_until(Duration::from_secs(5), || {
        publisher.subscriber_count() == 1
    }));

    let controller = LifecycleController::new(config(60_000, 4), publisher.clone()).unwrap();
    let source = ReplaySource::new(vec![FrameBuilder::beacon(mac(1), "office").at(0)])
        .hold_open(Duration::from_millis(5));
    controller.start(Box::new(source)).unwrap();

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).unwrap();
    let event: PresenceEvent = serde_json::from_str(line.trim_end()).unwrap();
    assert!(matches!(event, PresenceEvent::ApDiscovered(ref p) if p.address == mac(1)));
    assert!(line.starts_with(r#"{"event":"ap_discovered""#));

    controller.shutdown(ShutdownReason::Signal).unwrap();
    assert!(publisher.is_closed());
}

//! Benchmarks for frame interpretation and registry eviction.
//!
//! Benchmark targets:
//! - Beacon through the standard pipeline: <2us
//! - Rejected (truncated) frame: <200ns
//! - Eviction pass over 1000 records: <1ms

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]

use airtrack::capture::CapturedFrame;
use airtrack::models::{EntityKind, HwAddr};
use airtrack::publish::EventSink;
use airtrack::{Pipeline, PresenceEvent, Registry, SignalSmoothing};
use chrono::{DateTime, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

/// Sink that drops everything, so only registry work is measured.
struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, event: PresenceEvent) {
        black_box(event);
    }
}

fn registries() -> (Arc<Registry>, Arc<Registry>) {
    let sink: Arc<dyn EventSink> = Arc::new(NullSink);
    (
        Arc::new(Registry::new(
            EntityKind::Client,
            SignalSmoothing::default(),
            Arc::clone(&sink),
        )),
        Arc::new(Registry::new(
            EntityKind::AccessPoint,
            SignalSmoothing::default(),
            sink,
        )),
    )
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

/// Radiotap (flags, channel 6, -45 dBm) followed by a beacon for `bssid`.
fn beacon(bssid: [u8; 6]) -> Vec<u8> {
    let mut frame = vec![0, 0, 15, 0, 0x2a, 0, 0, 0, 0, 0, 0x85, 0x09, 0xa0, 0x00, 0xd3];
    frame.extend_from_slice(&[0x80, 0, 0, 0]);
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&bssid);
    frame.extend_from_slice(&bssid);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&[0; 8]);
    frame.extend_from_slice(&[0x64, 0x00, 0x11, 0x04]);
    frame.extend_from_slice(&[0, 6]);
    frame.extend_from_slice(b"office");
    frame.extend_from_slice(&[3, 1, 6]);
    frame
}

/// Radiotap followed by a wildcard probe request from `client`.
fn probe_request(client: [u8; 6]) -> Vec<u8> {
    let mut frame = vec![0, 0, 15, 0, 0x2a, 0, 0, 0, 0, 0, 0x85, 0x09, 0xa0, 0x00, 0xc4];
    frame.extend_from_slice(&[0x40, 0, 0, 0]);
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&client);
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&[0, 0]);
    frame
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    let (clients, aps) = registries();
    let pipeline = Pipeline::standard(clients, aps);

    let beacon = CapturedFrame::new(beacon([0x02, 0, 0, 0, 0, 1]), epoch());
    group.bench_function("beacon", |b| {
        b.iter(|| pipeline.process(black_box(&beacon)));
    });

    let probe = CapturedFrame::new(probe_request([0x02, 0, 0, 0, 1, 1]), epoch());
    group.bench_function("probe_request", |b| {
        b.iter(|| pipeline.process(black_box(&probe)));
    });

    let truncated = CapturedFrame::new(probe.data[..20].to_vec(), epoch());
    group.bench_function("truncated", |b| {
        b.iter(|| pipeline.process(black_box(&truncated)));
    });

    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    for size in [100u16, 1_000, 10_000] {
        group.throughput(Throughput::Elements(u64::from(size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let (clients, _) = registries();
                    for i in 0..size {
                        let [hi, lo] = i.to_be_bytes();
                        clients.record_sighting(HwAddr::new([0x02, 0, 0, 0, hi, lo]), -50, epoch(), None);
                    }
                    clients
                },
                |clients| {
                    clients.age_and_evict_at(0, epoch());
                    clients.age_and_evict_at(0, epoch())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_eviction);
criterion_main!(benches);

//! Benchmarks for the decode -> buffer -> range path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serialvis::buffer::TimeWindowBuffer;
use serialvis::decoder::{decode, RecordDecoder};
use serialvis::range::estimate;
use serialvis::types::{ReaderStats, Record, SchemaState};

const FIELDS: [&str; 7] = ["ax", "ay", "az", "gx", "gy", "gz", "dt_ms"];

fn dat_line(seq: usize) -> String {
    let t = seq as f64 * 10.0;
    format!(
        "DAT,{},{:.1},{:.4},{:.4},9.8100,{:.4},0.0012,-0.0004,10",
        seq,
        t,
        (t * 0.01).sin(),
        (t * 0.01).cos(),
        (t * 0.003).sin() * 0.2
    )
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let schema = SchemaState::with_fields(FIELDS);
    let line = dat_line(1234);
    let header = format!("HDR,1,IMU,fields={},rate=100", FIELDS.join(","));

    group.throughput(Throughput::Elements(1));
    group.bench_function("dat_line", |b| {
        b.iter(|| decode(black_box(&line), black_box(&schema)))
    });
    group.bench_function("hdr_line", |b| {
        b.iter(|| decode(black_box(&header), black_box(&schema)))
    });
    group.bench_function("noise_line", |b| {
        b.iter(|| decode(black_box("I (1234) boot: ok"), black_box(&schema)))
    });
    group.finish();
}

fn bench_buffer_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_ingest");

    let mut decoder = RecordDecoder::new();
    let mut stats = ReaderStats::default();
    let header = format!("HDR,1,IMU,fields={}", FIELDS.join(","));
    let mut records: Vec<Record> = decoder.feed(&header, &mut stats).into_iter().collect();
    records.extend((0..10_000).filter_map(|i| decoder.feed(&dat_line(i), &mut stats).ok()));

    for max_points in [1000usize, 5000].iter() {
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("records", max_points),
            max_points,
            |b, &max_points| {
                b.iter(|| {
                    let mut buffer = TimeWindowBuffer::new(max_points);
                    for record in &records {
                        buffer.ingest(record);
                    }
                    black_box(buffer.samples_seen())
                })
            },
        );
    }
    group.finish();
}

fn bench_window_and_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_and_range");

    let mut decoder = RecordDecoder::new();
    let mut stats = ReaderStats::default();
    let mut buffer = TimeWindowBuffer::new(5000);
    let header = format!("HDR,1,IMU,fields={}", FIELDS.join(","));
    if let Ok(record) = decoder.feed(&header, &mut stats) {
        buffer.ingest(&record);
    }
    for i in 0..5000 {
        if let Ok(record) = decoder.feed(&dat_line(i), &mut stats) {
            buffer.ingest(&record);
        }
    }

    let plotted = ["ax", "ay", "az", "gx", "gy", "gz"];
    for window in [1.0f64, 15.0].iter() {
        group.bench_with_input(
            BenchmarkId::new("windowed_view", window),
            window,
            |b, &window| b.iter(|| black_box(buffer.windowed_view(&plotted, window))),
        );
        group.bench_with_input(
            BenchmarkId::new("auto_range", window),
            window,
            |b, &window| {
                b.iter(|| {
                    let values = buffer.values_in_window(&plotted, window);
                    black_box(estimate(values, None, 0.05, 0.25, false))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_buffer_ingest,
    bench_window_and_range,
);
criterion_main!(benches);

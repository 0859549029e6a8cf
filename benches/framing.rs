//! Framing benchmark suite.
//!
//! Benchmarks the hot paths of the control plane:
//! - Line reassembly at different read sizes
//! - Chunk planning for common frame sizes
//! - Incoming line classification
//!
//! Run with: cargo bench --bench framing
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use display_link::client::chunk_lengths;
use display_link::protocol::Incoming;
use display_link::transport::LineBuffer;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const READ_SIZES: &[usize] = &[16, 256, 1024];
const FRAME_SIZES: &[usize] = &[128 * 128 * 2, 240 * 320 * 2, 480 * 320 * 2];
const CHUNK_SIZE: usize = 4096;

/// A receive stream mixing acknowledgements and device events.
fn control_stream(lines: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..lines {
        let line = match i % 3 {
            0 => "{\"status\":\"ready\",\"code\":0}\n".to_string(),
            1 => "{\"status\":\"ok\",\"code\":0,\"lastScreen\":\"screen1\"}\n".to_string(),
            _ => format!("{{\"command\":\"REQUEST_NEXT_SCREEN\",\"last\":\"s{i}\"}}\n"),
        };
        stream.extend_from_slice(line.as_bytes());
    }
    stream
}

// ============================================================================
// Benchmark: Line Reassembly
// ============================================================================

fn bench_line_reassembly(c: &mut Criterion) {
    let stream = control_stream(300);

    let mut group = c.benchmark_group("line_reassembly");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for &read_size in READ_SIZES {
        group.bench_with_input(
            BenchmarkId::new("read_size", read_size),
            &read_size,
            |b, &read_size| {
                b.iter(|| {
                    let mut lines = LineBuffer::new();
                    let mut count = 0usize;
                    for chunk in stream.chunks(read_size) {
                        lines.extend(chunk).expect("line within limit");
                        while let Some(line) = lines.next_line() {
                            count += line.len();
                        }
                    }
                    black_box(count)
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Chunk Planning
// ============================================================================

fn bench_chunk_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_planning");

    for &frame in FRAME_SIZES {
        group.bench_with_input(BenchmarkId::new("frame_bytes", frame), &frame, |b, &frame| {
            b.iter(|| black_box(chunk_lengths(black_box(frame), CHUNK_SIZE).sum::<usize>()));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Line Classification
// ============================================================================

fn bench_classification(c: &mut Criterion) {
    let lines = [
        "{\"status\":\"ready\",\"code\":0}",
        "{\"status\":\"ok\",\"code\":3,\"message\":\"fragment missing\"}",
        "{\"command\":\"REQUEST_STOP_SENDING\"}",
        "{\"unexpected\":true}",
    ];

    c.bench_function("classify_control_lines", |b| {
        b.iter(|| {
            for line in &lines {
                let _ = black_box(Incoming::parse(black_box(line)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_line_reassembly,
    bench_chunk_planning,
    bench_classification
);
criterion_main!(benches);

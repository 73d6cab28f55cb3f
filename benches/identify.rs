//! Benchmarks for signature matching and the heuristic fallback.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sift::{SignatureStore, classify, identify};

const PNG_HEADER: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x08, 0x06, 0x00, 0x00, 0x00,
];

fn text_block(size: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog.\n"
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

fn bench_load(c: &mut Criterion) {
    c.bench_function("load_builtin", |b| {
        b.iter(|| SignatureStore::builtin().expect("builtin database loads"))
    });
}

fn bench_identify(c: &mut Criterion) {
    let store = SignatureStore::builtin().expect("builtin database loads");

    c.bench_function("identify_png", |b| {
        b.iter(|| identify(&store, black_box(PNG_HEADER)))
    });

    let mut group = c.benchmark_group("identify_text");
    for size in [512usize, 4096, 8000] {
        let data = text_block(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| identify(&store, black_box(data)))
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let data = text_block(8000);
    c.bench_function("classify_ascii", |b| b.iter(|| classify(black_box(&data))));
}

criterion_group!(benches, bench_load, bench_identify, bench_classify);
criterion_main!(benches);

//! Piece commitment benchmarks.

use bale_bench::random_data;
use bale_core::{
    piece_commitment, zero_piece_commitment, CommitmentCalc, PaddedPieceSize, KIB, MIB,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Write;

/// Benchmark one-shot commitments over in-memory data.
fn bench_piece_commitment(c: &mut Criterion) {
    let mut group = c.benchmark_group("piece_commitment");

    for size in [KIB, 64 * KIB, MIB] {
        let data = random_data(size as usize);
        group.throughput(Throughput::Bytes(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let info = piece_commitment(black_box(data)).unwrap();
                black_box(info);
            });
        });
    }

    group.finish();
}

/// Benchmark streaming commitments fed in uneven writes.
fn bench_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("commitment_streaming");
    let data = random_data(MIB as usize);
    group.throughput(Throughput::Bytes(MIB));

    for write in [127usize, 4096, 65_536] {
        group.bench_with_input(BenchmarkId::new("write_size", write), &write, |b, &write| {
            b.iter(|| {
                let mut calc = CommitmentCalc::new();
                for chunk in data.chunks(write) {
                    calc.write_all(black_box(chunk)).unwrap();
                }
                black_box(calc.digest().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark zero-piece commitments, which are table lookups.
fn bench_zero_pieces(c: &mut Criterion) {
    c.bench_function("zero_piece_32gib", |b| {
        let size = PaddedPieceSize::new(32 * 1024 * MIB).unwrap();
        b.iter(|| black_box(zero_piece_commitment(black_box(size))));
    });
}

criterion_group!(benches, bench_piece_commitment, bench_streaming, bench_zero_pieces);
criterion_main!(benches);

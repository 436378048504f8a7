// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::semicolon_if_nothing_returned)] // Benchmark code formatting

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use hdds_discovery_core::fragment::{split, FragmentKey, FragmentReassembler, ReassemblyResult};
use hdds_discovery_core::GUID;
use std::time::Duration;

fn message(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn key(sequence: u64) -> FragmentKey {
    FragmentKey::new(GUID::new([9; 12], [0, 0, 1, 0xC2]), sequence)
}

// ============================================================================
// Reassembly Benchmarks
// ============================================================================

/// Benchmark: 64 KiB message, 1 KiB fragments, in order
fn bench_reassemble_in_order(c: &mut Criterion) {
    let msg = message(64 * 1024);
    let parts: Vec<_> = split(&msg, 1024)
        .into_iter()
        .map(|(header, bytes)| (header, bytes.to_vec()))
        .collect();

    c.bench_function("reassemble_64k_in_order", |b| {
        b.iter_batched(
            || FragmentReassembler::new(16, Duration::from_secs(5), 16),
            |mut buffer| {
                let mut result = ReassemblyResult::Incomplete;
                for (header, bytes) in &parts {
                    result = buffer.insert(key(1), *header, black_box(bytes));
                }
                black_box(result)
            },
            BatchSize::SmallInput,
        )
    });
}

/// Benchmark: same message, fragments shuffled with duplicates
fn bench_reassemble_shuffled(c: &mut Criterion) {
    let msg = message(64 * 1024);
    let mut parts: Vec<_> = split(&msg, 1024)
        .into_iter()
        .map(|(header, bytes)| (header, bytes.to_vec()))
        .collect();
    let duplicates: Vec<_> = parts.iter().step_by(7).cloned().collect();
    parts.extend(duplicates);
    fastrand::Rng::with_seed(42).shuffle(&mut parts);

    c.bench_function("reassemble_64k_shuffled", |b| {
        b.iter_batched(
            || FragmentReassembler::new(16, Duration::from_secs(5), 16),
            |mut buffer| {
                for (header, bytes) in &parts {
                    black_box(buffer.insert(key(1), *header, bytes));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

/// Benchmark: gap query on a half-received message
fn bench_gaps(c: &mut Criterion) {
    let msg = message(64 * 1024);
    let mut buffer = FragmentReassembler::new(16, Duration::from_secs(5), 16);
    for (header, bytes) in split(&msg, 512).into_iter().step_by(2) {
        buffer.insert(key(2), header, bytes);
    }

    c.bench_function("gaps_64k_half_received", |b| {
        b.iter(|| black_box(buffer.gaps(key(2), 256)))
    });
}

criterion_group!(
    benches,
    bench_reassemble_in_order,
    bench_reassemble_shuffled,
    bench_gaps
);
criterion_main!(benches);

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Offsets are small in tests

//! Randomized reassembly checks: arbitrary delivery order, duplicates and
//! overlapping re-slicings of the same message.

use hdds_discovery_core::fragment::{
    split, FragmentHeader, FragmentKey, FragmentRange, FragmentReassembler, ReassemblyResult,
    FIRST_OFFSET,
};
use hdds_discovery_core::GUID;
use std::time::{Duration, Instant};

const SEEDS: u64 = 200;

fn key(sequence: u64) -> FragmentKey {
    FragmentKey::new(GUID::new([3; 12], [0, 0, 1, 0xC2]), sequence)
}

fn message(len: usize, rng: &mut fastrand::Rng) -> Vec<u8> {
    (0..len).map(|_| rng.u8(..)).collect()
}

fn buffer() -> FragmentReassembler {
    FragmentReassembler::new(64, Duration::from_secs(5), 64)
}

/// Fragment covering `[start, end)` of `msg`, 1-based.
fn slice(msg: &[u8], start: u64, end: u64) -> (FragmentHeader, Vec<u8>) {
    let total_end = FIRST_OFFSET + msg.len() as u64;
    let header = FragmentHeader {
        range: FragmentRange::new(start, end),
        first: start == FIRST_OFFSET,
        last: end == total_end,
        message_len: Some(msg.len() as u64),
    };
    let bytes = msg[(start - FIRST_OFFSET) as usize..(end - FIRST_OFFSET) as usize].to_vec();
    (header, bytes)
}

/// Random fragments that together cover the whole message: a clean split
/// plus overlapping sub-ranges and exact duplicates.
fn delivery_plan(msg: &[u8], rng: &mut fastrand::Rng) -> Vec<(FragmentHeader, Vec<u8>)> {
    let chunk = rng.usize(1..=msg.len().min(64));
    let mut plan: Vec<(FragmentHeader, Vec<u8>)> = split(msg, chunk)
        .into_iter()
        .map(|(header, bytes)| (header, bytes.to_vec()))
        .collect();

    let end = FIRST_OFFSET + msg.len() as u64;
    for _ in 0..rng.usize(0..8) {
        let start = rng.u64(FIRST_OFFSET..end);
        let stop = rng.u64(start + 1..=end);
        plan.push(slice(msg, start, stop));
    }
    for _ in 0..rng.usize(0..4) {
        let duplicate = plan[rng.usize(..plan.len())].clone();
        plan.push(duplicate);
    }
    rng.shuffle(&mut plan);
    plan
}

/// Offsets `[start, end)` not yet covered by `held`, as ranges.
fn expected_gaps(held: &[bool]) -> Vec<FragmentRange> {
    let mut gaps = Vec::new();
    let mut open: Option<u64> = None;
    for (i, covered) in held.iter().enumerate() {
        let offset = FIRST_OFFSET + i as u64;
        match (covered, open) {
            (false, None) => open = Some(offset),
            (true, Some(start)) => {
                gaps.push(FragmentRange::new(start, offset));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        gaps.push(FragmentRange::new(start, FIRST_OFFSET + held.len() as u64));
    }
    gaps
}

#[test]
fn test_any_delivery_order_completes_exactly_once() {
    for seed in 0..SEEDS {
        let mut rng = fastrand::Rng::with_seed(seed);
        let msg = message(rng.usize(1..600), &mut rng);
        let plan = delivery_plan(&msg, &mut rng);

        let mut buf = buffer();
        let mut held = vec![false; msg.len()];
        let mut completions = 0;

        for (header, bytes) in &plan {
            let already_complete = completions > 0;
            for offset in header.range.start..header.range.end {
                held[(offset - FIRST_OFFSET) as usize] = true;
            }
            match buf.insert(key(1), *header, bytes) {
                ReassemblyResult::Complete(payload) => {
                    assert_eq!(payload, msg, "seed {}: wrong payload", seed);
                    assert!(held.iter().all(|h| *h), "seed {}: completed with holes", seed);
                    completions += 1;
                }
                ReassemblyResult::Duplicate => {
                    assert!(already_complete, "seed {}: duplicate before completion", seed)
                }
                ReassemblyResult::Incomplete => {
                    assert!(!already_complete, "seed {}: incomplete after completion", seed);
                    assert!(!held.iter().all(|h| *h), "seed {}: missed completion", seed);
                }
                ReassemblyResult::Rejected(reason) => {
                    panic!("seed {}: rejected {} ({})", seed, header.range, reason)
                }
            }
        }

        assert_eq!(completions, 1, "seed {}", seed);
        assert_eq!(buf.pending_count(), 0);
    }
}

#[test]
fn test_gaps_match_uncovered_ranges() {
    for seed in 0..SEEDS {
        let mut rng = fastrand::Rng::with_seed(seed);
        let msg = message(rng.usize(2..400), &mut rng);
        let plan = delivery_plan(&msg, &mut rng);

        let mut buf = buffer();
        let mut held = vec![false; msg.len()];

        for (header, bytes) in &plan {
            let mut next = held.clone();
            for offset in header.range.start..header.range.end {
                next[(offset - FIRST_OFFSET) as usize] = true;
            }
            if next.iter().all(|h| *h) {
                // Completing fragment; gaps are no longer tracked
                break;
            }
            held = next;
            assert_eq!(
                buf.insert(key(2), *header, bytes),
                ReassemblyResult::Incomplete,
                "seed {}",
                seed
            );
            assert_eq!(
                buf.gaps(key(2), usize::MAX),
                expected_gaps(&held),
                "seed {}: after {}",
                seed,
                header.range
            );
        }
    }
}

#[test]
fn test_redelivering_held_fragments_changes_nothing() {
    for seed in 0..SEEDS {
        let mut rng = fastrand::Rng::with_seed(seed);
        let msg = message(rng.usize(10..300), &mut rng);
        let parts: Vec<_> = split(&msg, rng.usize(1..=10))
            .into_iter()
            .map(|(header, bytes)| (header, bytes.to_vec()))
            .collect();
        if parts.len() < 2 {
            continue;
        }
        // Hold back one fragment so the message stays incomplete
        let withheld = rng.usize(..parts.len());

        let mut buf = buffer();
        for (i, (header, bytes)) in parts.iter().enumerate() {
            if i != withheld {
                buf.insert(key(3), *header, bytes);
            }
        }
        let before = buf.gaps(key(3), usize::MAX);
        assert_eq!(before, vec![parts[withheld].0.range], "seed {}", seed);

        for _ in 0..5 {
            let i = rng.usize(..parts.len());
            if i == withheld {
                continue;
            }
            let (header, bytes) = &parts[i];
            assert_eq!(buf.insert(key(3), *header, bytes), ReassemblyResult::Incomplete);
            assert_eq!(buf.gaps(key(3), usize::MAX), before, "seed {}", seed);
        }

        let (header, bytes) = &parts[withheld];
        assert_eq!(
            buf.insert(key(3), *header, bytes),
            ReassemblyResult::Complete(msg.clone())
        );
    }
}

#[test]
fn test_unavailable_range_filled_late() {
    let mut rng = fastrand::Rng::with_seed(7);
    let msg = message(299, &mut rng);
    let now = Instant::now();
    let mut buf = buffer();

    let (head, head_bytes) = slice(&msg, 1, 100);
    let (tail, tail_bytes) = slice(&msg, 150, 300);
    let (middle, middle_bytes) = slice(&msg, 100, 150);

    assert_eq!(buf.insert_at(key(4), head, &head_bytes, now), ReassemblyResult::Incomplete);
    assert_eq!(buf.insert_at(key(4), tail, &tail_bytes, now), ReassemblyResult::Incomplete);
    assert_eq!(buf.gaps(key(4), 8), vec![FragmentRange::new(100, 150)]);

    assert!(buf.mark_unavailable_at(key(4), FragmentRange::new(100, 150), now));
    assert!(buf.is_settled(key(4)));
    assert!(buf.gaps(key(4), 8).is_empty());

    assert_eq!(
        buf.insert_at(key(4), middle, &middle_bytes, now),
        ReassemblyResult::Complete(msg)
    );
    assert_eq!(buf.stats().completed, 1);
}

#[test]
fn test_interleaved_messages_do_not_mix() {
    let mut rng = fastrand::Rng::with_seed(11);
    let messages: Vec<Vec<u8>> = (0..4).map(|i| message(100 + i * 37, &mut rng)).collect();

    let mut deliveries: Vec<(u64, FragmentHeader, Vec<u8>)> = Vec::new();
    for (sequence, msg) in messages.iter().enumerate() {
        for (header, bytes) in split(msg, 16) {
            deliveries.push((sequence as u64, header, bytes.to_vec()));
        }
    }
    rng.shuffle(&mut deliveries);

    let mut buf = buffer();
    let mut completed = vec![None; messages.len()];
    for (sequence, header, bytes) in deliveries {
        if let ReassemblyResult::Complete(payload) = buf.insert(key(100 + sequence), header, &bytes) {
            completed[sequence as usize] = Some(payload);
        }
    }
    for (i, msg) in messages.iter().enumerate() {
        assert_eq!(completed[i].as_ref(), Some(msg), "message {}", i);
    }
}

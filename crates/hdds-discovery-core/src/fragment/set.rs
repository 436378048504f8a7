// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Held byte ranges of one in-flight message.

use super::{FragmentHeader, FragmentRange, RejectReason, FIRST_OFFSET};
use std::time::Instant;

/// One contiguous run of received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeldRange {
    range: FragmentRange,
    payload: Vec<u8>,
}

/// In-flight reconstruction of one logical message.
///
/// Invariants:
/// - `data` is sorted, non-overlapping, and never holds two touching ranges
///   (touching ranges are joined on insertion).
/// - `unavailable` is sorted, coalesced, and disjoint from `data`.
#[derive(Debug, Clone)]
pub(crate) struct FragmentSet {
    data: Vec<HeldRange>,
    unavailable: Vec<FragmentRange>,
    have_first: bool,
    last_end: Option<u64>,
    message_len: Option<u64>,
    pub(crate) first_seen: Instant,
    pub(crate) last_updated: Instant,
}

impl FragmentSet {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            data: Vec::new(),
            unavailable: Vec::new(),
            have_first: false,
            last_end: None,
            message_len: None,
            first_seen: now,
            last_updated: now,
        }
    }

    /// Check a fragment against what is already known, without mutating.
    fn validate(
        &self,
        header: &FragmentHeader,
        payload_len: usize,
        max_message_size: u64,
    ) -> Result<(), RejectReason> {
        let range = header.range;
        if range.is_empty() {
            return Err(RejectReason::EmptyRange);
        }
        if range.end > FIRST_OFFSET.saturating_add(max_message_size) {
            return Err(RejectReason::MessageTooLarge(range.end - FIRST_OFFSET));
        }
        if payload_len as u64 != range.len() {
            return Err(RejectReason::LengthMismatch {
                range_len: range.len(),
                payload_len,
            });
        }
        if header.first && range.start != FIRST_OFFSET {
            return Err(RejectReason::FirstNotAtOrigin(range.start));
        }

        if let Some(len) = header.message_len {
            if matches!(self.message_len, Some(known) if known != len) {
                return Err(RejectReason::ConflictingMessageLength);
            }
            if len > max_message_size {
                return Err(RejectReason::MessageTooLarge(len));
            }
            let end = FIRST_OFFSET
                .checked_add(len)
                .ok_or(RejectReason::ConflictingMessageLength)?;
            if range.end > end {
                return Err(RejectReason::BeyondLastFragment);
            }
            if header.last && range.end != end {
                return Err(RejectReason::ConflictingLastFragment);
            }
        }

        let message_end = self.message_end();
        if header.last {
            if matches!(message_end, Some(end) if end != range.end) {
                return Err(RejectReason::ConflictingLastFragment);
            }
            if self.highest_end().is_some_and(|end| end > range.end) {
                return Err(RejectReason::BeyondLastFragment);
            }
        } else if matches!(message_end, Some(end) if range.end > end) {
            return Err(RejectReason::BeyondLastFragment);
        }
        Ok(())
    }

    /// Merge a fragment. Returns `Ok(true)` when the set changed.
    pub(crate) fn insert(
        &mut self,
        header: &FragmentHeader,
        payload: &[u8],
        max_message_size: u64,
        now: Instant,
    ) -> Result<bool, RejectReason> {
        self.validate(header, payload.len(), max_message_size)?;
        self.last_updated = now;

        let mut changed = false;
        if header.first && !self.have_first {
            self.have_first = true;
            changed = true;
        }
        if header.last && self.last_end.is_none() {
            self.last_end = Some(header.range.end);
            changed = true;
        }
        if let Some(len) = header.message_len {
            if self.message_len.is_none() {
                self.message_len = Some(len);
                changed = true;
            }
        }

        // Only bytes nobody holds yet are merged; overlaps are dropped.
        for segment in self.uncovered(header.range) {
            let from = (segment.start - header.range.start) as usize;
            let to = (segment.end - header.range.start) as usize;
            self.merge_in(segment, &payload[from..to]);
            self.clear_unavailable(segment);
            changed = true;
        }
        Ok(changed)
    }

    /// Parts of `range` not covered by held data, in order.
    fn uncovered(&self, range: FragmentRange) -> Vec<FragmentRange> {
        let mut parts = Vec::new();
        let mut cursor = range.start;
        for held in &self.data {
            if held.range.end <= cursor {
                continue;
            }
            if held.range.start >= range.end {
                break;
            }
            if held.range.start > cursor {
                parts.push(FragmentRange::new(cursor, held.range.start));
            }
            cursor = cursor.max(held.range.end);
        }
        if cursor < range.end {
            parts.push(FragmentRange::new(cursor, range.end));
        }
        parts
    }

    /// Insert a segment known not to overlap held data, joining neighbours.
    fn merge_in(&mut self, segment: FragmentRange, bytes: &[u8]) {
        let idx = self
            .data
            .partition_point(|held| held.range.start < segment.start);
        let joins_left = idx > 0 && self.data[idx - 1].range.end == segment.start;
        let joins_right = idx < self.data.len() && self.data[idx].range.start == segment.end;

        match (joins_left, joins_right) {
            (true, true) => {
                let right = self.data.remove(idx);
                let left = &mut self.data[idx - 1];
                left.payload.extend_from_slice(bytes);
                left.payload.extend_from_slice(&right.payload);
                left.range.end = right.range.end;
            }
            (true, false) => {
                let left = &mut self.data[idx - 1];
                left.payload.extend_from_slice(bytes);
                left.range.end = segment.end;
            }
            (false, true) => {
                let right = &mut self.data[idx];
                let mut payload = Vec::with_capacity(bytes.len() + right.payload.len());
                payload.extend_from_slice(bytes);
                payload.extend_from_slice(&right.payload);
                right.payload = payload;
                right.range.start = segment.start;
            }
            (false, false) => self.data.insert(
                idx,
                HeldRange {
                    range: segment,
                    payload: bytes.to_vec(),
                },
            ),
        }
    }

    /// Real data supersedes placeholders.
    fn clear_unavailable(&mut self, segment: FragmentRange) {
        if self.unavailable.is_empty() {
            return;
        }
        let mut kept = Vec::with_capacity(self.unavailable.len() + 1);
        for placeholder in self.unavailable.drain(..) {
            if !placeholder.overlaps(&segment) {
                kept.push(placeholder);
                continue;
            }
            if placeholder.start < segment.start {
                kept.push(FragmentRange::new(placeholder.start, segment.start));
            }
            if segment.end < placeholder.end {
                kept.push(FragmentRange::new(segment.end, placeholder.end));
            }
        }
        self.unavailable = kept;
    }

    /// Record a permanently missing range. Returns `true` when the set changed.
    pub(crate) fn mark_unavailable(&mut self, range: FragmentRange, now: Instant) -> bool {
        let parts: Vec<FragmentRange> = self
            .uncovered(range)
            .into_iter()
            .flat_map(|part| subtract_all(part, &self.unavailable))
            .collect();
        if parts.is_empty() {
            return false;
        }
        self.last_updated = now;
        self.unavailable.extend(parts);
        self.unavailable = coalesce(std::mem::take(&mut self.unavailable));
        true
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.have_first
            && self.data.len() == 1
            && self.data[0].range.start == FIRST_OFFSET
            && self.last_end == Some(self.data[0].range.end)
    }

    /// Consume a complete set and return its payload.
    pub(crate) fn into_payload(mut self) -> Vec<u8> {
        self.data
            .pop()
            .map(|held| held.payload)
            .unwrap_or_default()
    }

    /// End offset of the whole message, when known.
    fn message_end(&self) -> Option<u64> {
        self.last_end
            .or_else(|| self.message_len.map(|len| FIRST_OFFSET.saturating_add(len)))
    }

    fn highest_end(&self) -> Option<u64> {
        self.data.last().map(|held| held.range.end)
    }

    /// Missing ranges, in order, excluding unavailable placeholders.
    pub(crate) fn gaps(&self, max_ranges: usize) -> Vec<FragmentRange> {
        let covered = coalesce(
            self.data
                .iter()
                .map(|held| held.range)
                .chain(self.unavailable.iter().copied())
                .collect(),
        );

        let mut gaps = Vec::new();
        let mut cursor = FIRST_OFFSET;
        for range in covered {
            if gaps.len() >= max_ranges {
                return gaps;
            }
            if range.start > cursor {
                gaps.push(FragmentRange::new(cursor, range.start));
            }
            cursor = cursor.max(range.end);
        }
        if let Some(end) = self.message_end() {
            if cursor < end && gaps.len() < max_ranges {
                gaps.push(FragmentRange::new(cursor, end));
            }
        }
        gaps
    }

    /// Every remaining hole is a placeholder: waiting longer is pointless.
    pub(crate) fn is_settled(&self) -> bool {
        !self.unavailable.is_empty() && self.message_end().is_some() && self.gaps(1).is_empty()
    }

    #[cfg(test)]
    pub(crate) fn held_ranges(&self) -> Vec<FragmentRange> {
        self.data.iter().map(|held| held.range).collect()
    }

    #[cfg(test)]
    pub(crate) fn unavailable_ranges(&self) -> &[FragmentRange] {
        &self.unavailable
    }
}

/// State equality ignoring timestamps.
impl PartialEq for FragmentSet {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.unavailable == other.unavailable
            && self.have_first == other.have_first
            && self.last_end == other.last_end
            && self.message_len == other.message_len
    }
}

/// Sort and join overlapping or touching ranges.
fn coalesce(mut ranges: Vec<FragmentRange>) -> Vec<FragmentRange> {
    ranges.sort_by_key(|range| range.start);
    let mut out: Vec<FragmentRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match out.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => out.push(range),
        }
    }
    out
}

/// `range` minus every range in `holes` (which is sorted and disjoint).
fn subtract_all(range: FragmentRange, holes: &[FragmentRange]) -> Vec<FragmentRange> {
    let mut parts = Vec::new();
    let mut cursor = range.start;
    for hole in holes {
        if hole.end <= cursor || hole.start >= range.end {
            continue;
        }
        if hole.start > cursor {
            parts.push(FragmentRange::new(cursor, hole.start));
        }
        cursor = cursor.max(hole.end);
    }
    if cursor < range.end {
        parts.push(FragmentRange::new(cursor, range.end));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1 << 16;

    fn header(start: u64, end: u64, first: bool, last: bool) -> FragmentHeader {
        FragmentHeader {
            range: FragmentRange::new(start, end),
            first,
            last,
            message_len: None,
        }
    }

    fn bytes(range: FragmentRange) -> Vec<u8> {
        (range.start..range.end).map(|b| b as u8).collect()
    }

    fn put(set: &mut FragmentSet, h: FragmentHeader) -> Result<bool, RejectReason> {
        set.insert(&h, &bytes(h.range), LIMIT, Instant::now())
    }

    #[test]
    fn test_joins_both_sides_in_one_step() {
        let mut set = FragmentSet::new(Instant::now());
        put(&mut set, header(1, 10, true, false)).unwrap();
        put(&mut set, header(20, 30, false, false)).unwrap();
        assert_eq!(set.held_ranges().len(), 2);

        put(&mut set, header(10, 20, false, false)).unwrap();
        assert_eq!(set.held_ranges(), vec![FragmentRange::new(1, 30)]);
        assert_eq!(set.data[0].payload, bytes(FragmentRange::new(1, 30)));
    }

    #[test]
    fn test_partial_overlap_keeps_only_novel_bytes() {
        let mut set = FragmentSet::new(Instant::now());
        put(&mut set, header(5, 15, false, false)).unwrap();
        put(&mut set, header(1, 10, true, false)).unwrap();
        put(&mut set, header(12, 20, false, true)).unwrap();

        assert_eq!(set.held_ranges(), vec![FragmentRange::new(1, 20)]);
        assert!(set.is_complete());
        assert_eq!(set.into_payload(), bytes(FragmentRange::new(1, 20)));
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut set = FragmentSet::new(Instant::now());
        put(&mut set, header(1, 10, true, false)).unwrap();
        let before = set.clone();
        assert_eq!(put(&mut set, header(1, 10, true, false)), Ok(false));
        assert_eq!(set, before);
    }

    #[test]
    fn test_rejects_inconsistent_headers() {
        let mut set = FragmentSet::new(Instant::now());
        put(&mut set, header(20, 30, false, true)).unwrap();

        assert_eq!(
            put(&mut set, header(25, 35, false, false)),
            Err(RejectReason::BeyondLastFragment)
        );
        assert_eq!(
            put(&mut set, header(10, 25, false, true)),
            Err(RejectReason::ConflictingLastFragment)
        );
        assert_eq!(
            put(&mut set, header(3, 9, true, false)),
            Err(RejectReason::FirstNotAtOrigin(3))
        );
        let bad_len = header(1, 5, true, false);
        assert!(matches!(
            set.insert(&bad_len, &[0u8; 3], LIMIT, Instant::now()),
            Err(RejectReason::LengthMismatch { .. })
        ));
        // Nothing above changed the set
        assert_eq!(set.held_ranges(), vec![FragmentRange::new(20, 30)]);
    }

    #[test]
    fn test_gaps_and_placeholders() {
        let mut set = FragmentSet::new(Instant::now());
        put(&mut set, header(10, 20, false, false)).unwrap();
        put(&mut set, header(30, 40, false, true)).unwrap();
        assert_eq!(
            set.gaps(8),
            vec![FragmentRange::new(1, 10), FragmentRange::new(20, 30)]
        );
        assert_eq!(set.gaps(1), vec![FragmentRange::new(1, 10)]);

        assert!(set.mark_unavailable(FragmentRange::new(20, 30), Instant::now()));
        assert!(!set.mark_unavailable(FragmentRange::new(20, 30), Instant::now()));
        assert_eq!(set.gaps(8), vec![FragmentRange::new(1, 10)]);
        assert!(!set.is_settled());

        set.mark_unavailable(FragmentRange::new(1, 10), Instant::now());
        assert!(set.gaps(8).is_empty());
        assert!(set.is_settled());
        assert!(!set.is_complete());
    }

    #[test]
    fn test_message_len_reports_trailing_gap() {
        let mut set = FragmentSet::new(Instant::now());
        let h = FragmentHeader {
            range: FragmentRange::new(1, 10),
            first: true,
            last: false,
            message_len: Some(30),
        };
        set.insert(&h, &bytes(h.range), LIMIT, Instant::now()).unwrap();
        assert_eq!(set.gaps(4), vec![FragmentRange::new(10, 31)]);
    }

    #[test]
    fn test_hostile_message_len_is_rejected() {
        let mut set = FragmentSet::new(Instant::now());
        let overflow = FragmentHeader {
            range: FragmentRange::new(1, 2),
            first: true,
            last: false,
            message_len: Some(u64::MAX),
        };
        assert_eq!(
            set.insert(&overflow, &[7], u64::MAX, Instant::now()),
            Err(RejectReason::ConflictingMessageLength)
        );
        assert_eq!(
            set.insert(&overflow, &[7], LIMIT, Instant::now()),
            Err(RejectReason::MessageTooLarge(u64::MAX))
        );

        let far = header(LIMIT, LIMIT + 2, false, true);
        assert_eq!(put(&mut set, far), Err(RejectReason::MessageTooLarge(LIMIT + 1)));
        assert!(set.held_ranges().is_empty());
        assert!(set.gaps(4).is_empty());

        // Exactly at the limit is fine
        let edge = header(LIMIT, LIMIT + 1, false, true);
        assert_eq!(put(&mut set, edge), Ok(true));
    }

    #[test]
    fn test_coalesce_and_subtract() {
        let merged = coalesce(vec![
            FragmentRange::new(10, 20),
            FragmentRange::new(1, 5),
            FragmentRange::new(5, 8),
            FragmentRange::new(15, 25),
        ]);
        assert_eq!(
            merged,
            vec![FragmentRange::new(1, 8), FragmentRange::new(10, 25)]
        );
        assert_eq!(
            subtract_all(FragmentRange::new(1, 30), &merged),
            vec![FragmentRange::new(8, 10), FragmentRange::new(25, 30)]
        );
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragment reassembly for discovery messages larger than one datagram.
//!
//
// Discovery metadata (participant announcements with many locators, endpoint
// records with long partition lists, handshake tokens) can exceed the
// datagram size. Senders split such messages into byte ranges; this module
// puts them back together:
//
// - Out-of-order and duplicate fragments (overlaps are trimmed, never stored twice)
// - Range joining on adjacency, both sides at once
// - Permanent placeholders for ranges the sender will never deliver
// - Gap queries for NACK generation
// - Timeout and LRU eviction of incomplete messages
// - Redelivery suppression for recently completed messages
//
// Offsets are 1-based, following RTPS fragment numbering.

mod set;

use crate::guid::GUID;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use set::FragmentSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Offset of the first byte of every message.
pub const FIRST_OFFSET: u64 = 1;

/// Reassembly size limit unless configured otherwise (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1 << 20;

/// Half-open byte range `[start, end)` within a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentRange {
    pub start: u64,
    pub end: u64,
}

impl FragmentRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &FragmentRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for FragmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// Per-fragment header fields, as decoded by the wire codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentHeader {
    pub range: FragmentRange,
    /// This fragment starts the message
    pub first: bool,
    /// No more fragments follow this one
    pub last: bool,
    /// Total message length in bytes, when the sender announces it
    pub message_len: Option<u64>,
}

/// Identity of one logical message: writer plus sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub writer: GUID,
    pub sequence: u64,
}

impl FragmentKey {
    pub fn new(writer: GUID, sequence: u64) -> Self {
        Self { writer, sequence }
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.writer, self.sequence)
    }
}

/// Why a fragment was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EmptyRange,
    LengthMismatch { range_len: u64, payload_len: usize },
    /// First-fragment flag on a range not starting at [`FIRST_OFFSET`]
    FirstNotAtOrigin(u64),
    /// Last-fragment flag disagrees with an earlier one or the message length
    ConflictingLastFragment,
    /// Range extends past the known end of the message
    BeyondLastFragment,
    ConflictingMessageLength,
    /// Message would exceed the reassembly size limit
    MessageTooLarge(u64),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRange => write!(f, "empty range"),
            Self::LengthMismatch {
                range_len,
                payload_len,
            } => write!(f, "payload {} bytes for range of {}", payload_len, range_len),
            Self::FirstNotAtOrigin(start) => write!(f, "first fragment starts at {}", start),
            Self::ConflictingLastFragment => write!(f, "conflicting last fragment"),
            Self::BeyondLastFragment => write!(f, "range past end of message"),
            Self::ConflictingMessageLength => write!(f, "conflicting message length"),
            Self::MessageTooLarge(len) => write!(f, "message of {} bytes over limit", len),
        }
    }
}

/// Outcome of [`FragmentReassembler::insert`].
#[derive(Debug, PartialEq, Eq)]
pub enum ReassemblyResult {
    Incomplete,
    Complete(Vec<u8>),
    /// Late fragment of a message that was already delivered
    Duplicate,
    Rejected(RejectReason),
}

/// Counters kept by the reassembler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub completed: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub evicted: u64,
    pub expired: u64,
}

/// Fragment reassembly buffer.
///
/// # Memory Management
///
/// - `max_pending`: maximum number of incomplete messages; the least recently
///   updated one is evicted when exceeded
/// - `timeout`: incomplete messages idle longer than this are dropped by
///   [`evict_expired`](Self::evict_expired)
/// - `completed_history`: how many delivered keys are remembered to drop
///   late duplicates
/// - `max_message_size`: fragments of longer messages are rejected
///   ([`DEFAULT_MAX_MESSAGE_SIZE`] unless set with
///   [`with_max_message_size`](Self::with_max_message_size))
///
/// # Usage
///
/// ```
/// use hdds_discovery_core::fragment::{
///     FragmentHeader, FragmentKey, FragmentRange, FragmentReassembler, ReassemblyResult,
/// };
/// use hdds_discovery_core::GUID;
/// use std::time::Duration;
///
/// let mut buffer = FragmentReassembler::new(64, Duration::from_millis(500), 128);
/// let key = FragmentKey::new(GUID::zero(), 1);
/// let tail = FragmentHeader { range: FragmentRange::new(4, 7), first: false, last: true, message_len: None };
/// assert_eq!(buffer.insert(key, tail, b"def"), ReassemblyResult::Incomplete);
///
/// let head = FragmentHeader { range: FragmentRange::new(1, 4), first: true, last: false, message_len: None };
/// assert_eq!(buffer.insert(key, head, b"abc"), ReassemblyResult::Complete(b"abcdef".to_vec()));
/// ```
pub struct FragmentReassembler {
    pending: LruCache<FragmentKey, FragmentSet>,
    completed: LruCache<FragmentKey, ()>,
    timeout: Duration,
    max_message_size: u64,
    stats: ReassemblyStats,
}

impl FragmentReassembler {
    pub fn new(max_pending: usize, timeout: Duration, completed_history: usize) -> Self {
        Self {
            pending: LruCache::new(NonZeroUsize::new(max_pending).unwrap_or(NonZeroUsize::MIN)),
            completed: LruCache::new(
                NonZeroUsize::new(completed_history).unwrap_or(NonZeroUsize::MIN),
            ),
            timeout,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            stats: ReassemblyStats::default(),
        }
    }

    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: u64) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Insert a fragment and attempt reassembly.
    pub fn insert(
        &mut self,
        key: FragmentKey,
        header: FragmentHeader,
        payload: &[u8],
    ) -> ReassemblyResult {
        self.insert_at(key, header, payload, Instant::now())
    }

    /// [`insert`](Self::insert) with an explicit clock reading.
    pub fn insert_at(
        &mut self,
        key: FragmentKey,
        header: FragmentHeader,
        payload: &[u8],
        now: Instant,
    ) -> ReassemblyResult {
        crate::trace_fn!("FragmentReassembler::insert_at");
        if self.completed.contains(&key) {
            self.stats.duplicates += 1;
            return ReassemblyResult::Duplicate;
        }

        let limit = self.max_message_size;
        let outcome = match self.pending.get_mut(&key) {
            Some(set) => set.insert(&header, payload, limit, now),
            None => {
                let mut set = FragmentSet::new(now);
                let outcome = set.insert(&header, payload, limit, now);
                if outcome.is_ok() {
                    self.admit(key, set);
                }
                outcome
            }
        };

        if let Err(reason) = outcome {
            self.stats.rejected += 1;
            log::debug!(
                "[FragBuf] Rejected fragment {} of {}: {}",
                header.range,
                key,
                reason
            );
            return ReassemblyResult::Rejected(reason);
        }

        let complete = self.pending.peek(&key).is_some_and(FragmentSet::is_complete);
        if !complete {
            return ReassemblyResult::Incomplete;
        }

        match self.pending.pop(&key) {
            Some(set) => {
                self.completed.put(key, ());
                self.stats.completed += 1;
                log::debug!("[FragBuf] Reassembled {}", key);
                ReassemblyResult::Complete(set.into_payload())
            }
            None => ReassemblyResult::Incomplete,
        }
    }

    /// Admit a new set, evicting the least recently updated one when full.
    fn admit(&mut self, key: FragmentKey, set: FragmentSet) {
        if let Some((evicted, old)) = self.pending.push(key, set) {
            if evicted != key {
                self.stats.evicted += 1;
                log::warn!(
                    "[FragBuf] Buffer full, evicting {} (age {:?})",
                    evicted,
                    old.last_updated.saturating_duration_since(old.first_seen)
                );
            }
        }
    }

    /// Record that `range` of message `key` will never be delivered.
    ///
    /// Returns `true` when every remaining hole of the message is now a
    /// placeholder, i.e. the caller can stop requesting retransmissions.
    pub fn mark_unavailable(&mut self, key: FragmentKey, range: FragmentRange) -> bool {
        self.mark_unavailable_at(key, range, Instant::now())
    }

    pub fn mark_unavailable_at(
        &mut self,
        key: FragmentKey,
        range: FragmentRange,
        now: Instant,
    ) -> bool {
        if range.is_empty() || self.completed.contains(&key) {
            return false;
        }
        match self.pending.get_mut(&key) {
            Some(set) => {
                set.mark_unavailable(range, now);
            }
            None => {
                let mut set = FragmentSet::new(now);
                set.mark_unavailable(range, now);
                self.admit(key, set);
            }
        }
        log::debug!("[FragBuf] {} of {} marked unavailable", range, key);
        self.is_settled(key)
    }

    /// Missing ranges of `key`, in order, at most `max_ranges` of them.
    ///
    /// Ranges marked unavailable are never reported.
    pub fn gaps(&self, key: FragmentKey, max_ranges: usize) -> Vec<FragmentRange> {
        self.pending
            .peek(&key)
            .map(|set| set.gaps(max_ranges))
            .unwrap_or_default()
    }

    /// True when only placeholder ranges are missing from `key`.
    pub fn is_settled(&self, key: FragmentKey) -> bool {
        self.pending.peek(&key).is_some_and(FragmentSet::is_settled)
    }

    /// Discard an in-flight message.
    pub fn drop_sequence(&mut self, key: FragmentKey) -> bool {
        self.pending.pop(&key).is_some()
    }

    /// Drop incomplete messages idle for longer than the timeout.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<FragmentKey> {
        let expired: Vec<FragmentKey> = self
            .pending
            .iter()
            .filter(|(_, set)| now.saturating_duration_since(set.last_updated) > self.timeout)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            self.pending.pop(key);
            log::debug!("[FragBuf] Timeout: evicting incomplete {}", key);
        }
        self.stats.expired += expired.len() as u64;
        expired
    }

    /// Drop every in-flight message from one writer's participant.
    pub fn remove_participant(&mut self, prefix: &[u8; 12]) {
        let keys: Vec<FragmentKey> = self
            .pending
            .iter()
            .filter(|(key, _)| &key.writer.prefix == prefix)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.pending.pop(&key);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    #[cfg(test)]
    pub(crate) fn held_ranges(&self, key: FragmentKey) -> Vec<FragmentRange> {
        self.pending
            .peek(&key)
            .map(FragmentSet::held_ranges)
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn unavailable_ranges(&self, key: FragmentKey) -> Vec<FragmentRange> {
        self.pending
            .peek(&key)
            .map(|set| set.unavailable_ranges().to_vec())
            .unwrap_or_default()
    }
}

/// Split an encoded message into fragment headers and payload slices.
///
/// Each fragment carries at most `max_fragment` bytes. Returns an empty list
/// for an empty payload.
pub fn split(payload: &[u8], max_fragment: usize) -> Vec<(FragmentHeader, &[u8])> {
    let max_fragment = max_fragment.max(1);
    let total = payload.len() as u64;
    let count = payload.chunks(max_fragment).len();

    payload
        .chunks(max_fragment)
        .enumerate()
        .map(|(i, chunk)| {
            let start = FIRST_OFFSET + (i * max_fragment) as u64;
            let header = FragmentHeader {
                range: FragmentRange::new(start, start + chunk.len() as u64),
                first: i == 0,
                last: i + 1 == count,
                message_len: Some(total),
            };
            (header, chunk)
        })
        .collect()
}

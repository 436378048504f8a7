// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery metrics.
//!
//! Atomic counters updated from inbound processing, the scheduler and the
//! drain loop. Readers take a [`MetricsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    /// Datagrams handed to `on_datagram_received`
    pub datagrams_received: AtomicU64,
    /// Datagrams dropped by the runtime because its inbound queue was full
    pub inbound_dropped: AtomicU64,
    /// Datagrams (or fragments) handed to the transport
    pub datagrams_sent: AtomicU64,
    /// Undecodable datagrams and rejected fragments
    pub malformed: AtomicU64,
    pub fragments_completed: AtomicU64,
    pub participants_discovered: AtomicU64,
    pub participants_expired: AtomicU64,
    pub participants_removed: AtomicU64,
    pub endpoints_rejected: AtomicU64,
    pub associations_established: AtomicU64,
    pub associations_removed: AtomicU64,
    pub incompatible_qos: AtomicU64,
    pub inconsistent_type: AtomicU64,
    pub handshakes_validated: AtomicU64,
    pub security_errors: AtomicU64,
    pub retries_sent: AtomicU64,
    pub retries_abandoned: AtomicU64,
    pub transport_errors: AtomicU64,
    pub codec_errors: AtomicU64,
    pub status_dropped: AtomicU64,
    pub invariant_violations: AtomicU64,
}

/// Point-in-time copy of [`DiscoveryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub inbound_dropped: u64,
    pub datagrams_sent: u64,
    pub malformed: u64,
    pub fragments_completed: u64,
    pub participants_discovered: u64,
    pub participants_expired: u64,
    pub participants_removed: u64,
    pub endpoints_rejected: u64,
    pub associations_established: u64,
    pub associations_removed: u64,
    pub incompatible_qos: u64,
    pub inconsistent_type: u64,
    pub handshakes_validated: u64,
    pub security_errors: u64,
    pub retries_sent: u64,
    pub retries_abandoned: u64,
    pub transport_errors: u64,
    pub codec_errors: u64,
    pub status_dropped: u64,
    pub invariant_violations: u64,
}

impl DiscoveryMetrics {
    #[must_use]
    pub fn new() -> Self {
        crate::trace_fn!("DiscoveryMetrics::new");
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            datagrams_received: load(&self.datagrams_received),
            inbound_dropped: load(&self.inbound_dropped),
            datagrams_sent: load(&self.datagrams_sent),
            malformed: load(&self.malformed),
            fragments_completed: load(&self.fragments_completed),
            participants_discovered: load(&self.participants_discovered),
            participants_expired: load(&self.participants_expired),
            participants_removed: load(&self.participants_removed),
            endpoints_rejected: load(&self.endpoints_rejected),
            associations_established: load(&self.associations_established),
            associations_removed: load(&self.associations_removed),
            incompatible_qos: load(&self.incompatible_qos),
            inconsistent_type: load(&self.inconsistent_type),
            handshakes_validated: load(&self.handshakes_validated),
            security_errors: load(&self.security_errors),
            retries_sent: load(&self.retries_sent),
            retries_abandoned: load(&self.retries_abandoned),
            transport_errors: load(&self.transport_errors),
            codec_errors: load(&self.codec_errors),
            status_dropped: load(&self.status_dropped),
            invariant_violations: load(&self.invariant_violations),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State owned by the domain lock, and the context shared with it.

use crate::association::AssociationTable;
use crate::config::DiscoveryConfig;
use crate::directory::Directory;
use crate::events::{Outbound, OutboundQueue, StatusEvent};
use crate::fragment::FragmentReassembler;
use crate::guid::GUID;
use crate::matching::QosDiagnostics;
use crate::messages::{DiscoveryMessage, ParticipantData};
use crate::metrics::DiscoveryMetrics;
use crate::scheduler::{AnnounceSchedule, FibonacciBackoff, RelayRefresh, ReliableOutbox};
use crate::security::SecurityGate;
use crate::transport::{DataPath, Locator};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read-only context the state machine needs but does not own.
pub(crate) struct Shared {
    /// Local participant GUID
    pub(crate) local: GUID,
    pub(crate) config: DiscoveryConfig,
    /// Default data path (a local endpoint may override it)
    pub(crate) data_path: Arc<dyn DataPath>,
    pub(crate) outbound: OutboundQueue,
    pub(crate) metrics: Arc<DiscoveryMetrics>,
    pub(crate) diagnostics: QosDiagnostics,
}

impl Shared {
    pub(crate) fn status(&self, event: StatusEvent) {
        self.outbound.push(Outbound::Status(event));
    }

    pub(crate) fn transmit(&self, destination: Locator, message: DiscoveryMessage) {
        self.outbound.push(Outbound::Transmit {
            destination,
            message,
        });
    }
}

pub(crate) struct DomainState {
    pub(crate) directory: Directory,
    pub(crate) associations: AssociationTable,
    pub(crate) gate: Option<SecurityGate>,
    pub(crate) reassembler: FragmentReassembler,
    pub(crate) announce: AnnounceSchedule,
    pub(crate) relay: Option<RelayRefresh>,
    /// Unacknowledged endpoint metadata, per destination participant
    pub(crate) outboxes: HashMap<GUID, ReliableOutbox>,
    /// Metadata abandoned per destination, by subject endpoint. Sent again
    /// once the destination is heard from.
    pub(crate) unreached: HashMap<GUID, BTreeMap<GUID, (u64, DiscoveryMessage)>>,
    pub(crate) incarnation: u64,
    /// Sequence of the latest participant announcement
    pub(crate) announcement_sequence: u64,
    /// Last assigned endpoint metadata sequence
    pub(crate) metadata_sequence: u64,
}

impl DomainState {
    pub(crate) fn new(
        shared: &Shared,
        gate: Option<SecurityGate>,
        incarnation: u64,
    ) -> Self {
        let config = &shared.config;
        let relay = config
            .relay
            .map(|locator| RelayRefresh::new(locator, retry_backoff(config)));
        Self {
            directory: Directory::new(
                shared.local,
                config.directory.max_participants,
                config.directory.expired_history,
            ),
            associations: AssociationTable::new(),
            gate,
            reassembler: FragmentReassembler::new(
                config.fragments.max_pending,
                Duration::from_millis(config.fragments.timeout_ms),
                config.fragments.completed_history,
            )
            .with_max_message_size(config.fragments.max_message_size),
            announce: AnnounceSchedule::new(config.announce_period()),
            relay,
            outboxes: HashMap::new(),
            unreached: HashMap::new(),
            incarnation,
            announcement_sequence: 0,
            metadata_sequence: 0,
        }
    }

    /// Current local participant announcement.
    pub(crate) fn participant_data(&self, shared: &Shared) -> ParticipantData {
        ParticipantData {
            guid: shared.local,
            domain_id: shared.config.domain_id,
            incarnation: self.incarnation,
            sequence: self.announcement_sequence,
            lease_duration: shared.config.lease_duration(),
            locators: shared.config.unicast_locators.clone(),
            security_enabled: self.gate.is_some(),
            identity_token: self.gate.as_ref().map(|gate| gate.identity_token().clone()),
        }
    }

    pub(crate) fn next_metadata_sequence(&mut self) -> u64 {
        self.metadata_sequence += 1;
        self.metadata_sequence
    }

    /// Where unicast traffic for `participant` goes.
    pub(crate) fn destination(&self, shared: &Shared, participant: GUID) -> Option<Locator> {
        self.directory
            .view()
            .participant(&participant)
            .and_then(|record| record.locators.first().copied())
            .or(shared.config.multicast_group)
    }

    pub(crate) fn send_to_participant(
        &self,
        shared: &Shared,
        participant: GUID,
        message: DiscoveryMessage,
    ) {
        match self.destination(shared, participant) {
            Some(destination) => shared.transmit(destination, message),
            None => log::debug!(
                "[discovery] No locator for {}, dropping {}",
                participant,
                message.kind_name()
            ),
        }
    }

    /// Send endpoint metadata about `subject` and keep it until acknowledged.
    pub(crate) fn send_reliable(
        &mut self,
        shared: &Shared,
        participant: GUID,
        subject: GUID,
        sequence: u64,
        message: DiscoveryMessage,
        now: Instant,
    ) {
        if let Some(stalled) = self.unreached.get_mut(&participant) {
            stalled.remove(&subject);
        }
        let config = &shared.config;
        self.outboxes
            .entry(participant)
            .or_insert_with(|| {
                ReliableOutbox::new(
                    participant,
                    retry_backoff(config),
                    Duration::from_millis(config.retry.deadline_ms),
                )
            })
            .push(sequence, subject, message.clone(), now);
        self.send_to_participant(shared, participant, message);
    }

    /// Participants currently able to receive metadata.
    pub(crate) fn live_participants(&self) -> Vec<GUID> {
        let mut guids: Vec<GUID> = self
            .directory
            .view()
            .participants()
            .filter(|record| !record.removing)
            .map(|record| record.guid)
            .collect();
        guids.sort();
        guids
    }

    /// Bump the announcement sequence and send it to the group and the
    /// initial peers. The relay has its own schedule.
    pub(crate) fn announce_participant(&mut self, shared: &Shared) {
        self.announcement_sequence += 1;
        let message = DiscoveryMessage::Participant(self.participant_data(shared));
        let config = &shared.config;
        let targets = config
            .multicast_group
            .iter()
            .chain(config.initial_peers.iter());
        for destination in targets {
            shared.transmit(*destination, message.clone());
        }
        log::debug!(
            "[discovery] Announced {} (seq {})",
            shared.local,
            self.announcement_sequence
        );
    }
}

fn retry_backoff(config: &DiscoveryConfig) -> FibonacciBackoff {
    FibonacciBackoff::new(
        Duration::from_millis(config.retry.initial_ms),
        Duration::from_millis(config.retry.ceiling_ms),
    )
}

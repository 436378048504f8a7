// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoded inbound messages.

use super::state::{DomainState, Shared};
use crate::directory::{DirectoryError, EndpointChange, ParticipantChange};
use crate::events::{LossReason, StatusEvent};
use crate::fragment::{FragmentKey, ReassemblyResult};
use crate::guid::GUID;
use crate::messages::{DiscoveryMessage, EndpointData, FragmentMessage, HandshakeMessage, ParticipantData};
use crate::metrics::DiscoveryMetrics;
use crate::security::Peer;
use std::time::Instant;

impl DomainState {
    /// Apply one message. Payloads reassembled from fragments are pushed to
    /// `reassembled` for the caller to decode outside the lock.
    pub(crate) fn handle_message(
        &mut self,
        shared: &Shared,
        message: DiscoveryMessage,
        now: Instant,
        reassembled: &mut Vec<Vec<u8>>,
    ) {
        crate::trace_fn!("DomainState::handle_message");
        match message {
            DiscoveryMessage::Participant(data) => self.on_participant(shared, data, now),
            DiscoveryMessage::ParticipantDisposed { guid, sequence } => {
                self.on_participant_disposed(shared, guid, sequence)
            }
            DiscoveryMessage::Endpoint(data) => self.on_endpoint(shared, data, now),
            DiscoveryMessage::EndpointDisposed {
                guid,
                participant,
                sequence,
            } => self.on_endpoint_disposed(shared, guid, participant, sequence),
            DiscoveryMessage::Ack {
                source,
                destination,
                sequence,
            } => {
                if destination == shared.local {
                    if let Some(outbox) = self.outboxes.get_mut(&source) {
                        outbox.acknowledge(sequence, now);
                    }
                }
            }
            DiscoveryMessage::Fragment(fragment) => {
                self.on_fragment(shared, fragment, now, reassembled)
            }
            DiscoveryMessage::Handshake(message) => self.on_handshake(shared, message, now),
        }
    }

    fn on_participant(&mut self, shared: &Shared, data: ParticipantData, now: Instant) {
        if data.guid == shared.local {
            return;
        }
        if data.domain_id != shared.config.domain_id {
            log::debug!(
                "[discovery] Ignoring {} from domain {}",
                data.guid,
                data.domain_id
            );
            return;
        }
        if !data.guid.is_participant() {
            DiscoveryMetrics::bump(&shared.metrics.malformed);
            log::debug!("[discovery] Participant data with endpoint GUID {}", data.guid);
            return;
        }
        if self.gate.is_some()
            && shared.config.security.require_authentication
            && !data.security_enabled
        {
            DiscoveryMetrics::bump(&shared.metrics.security_errors);
            log::debug!("[discovery] Ignoring unauthenticated participant {}", data.guid);
            // A known participant that dropped security is no longer trusted
            self.remove_participant(shared, data.guid, LossReason::Unauthenticated);
            return;
        }

        match self.directory.upsert_participant(&data, now) {
            ParticipantChange::Added { evicted } => {
                DiscoveryMetrics::bump(&shared.metrics.participants_discovered);
                shared.status(StatusEvent::ParticipantDiscovered { guid: data.guid });
                if let Some(victim) = evicted {
                    self.remove_participant(shared, victim, LossReason::Evicted);
                }
                self.on_participant_added(shared, &data, now);
            }
            ParticipantChange::Updated { .. } => {
                let lifted = match self.gate.as_mut() {
                    Some(gate) => gate.on_fresh_announcement(Peer {
                        guid: data.guid,
                        token: data.identity_token.as_ref(),
                        sequence: data.sequence,
                    }),
                    None => false,
                };
                if lifted {
                    self.rematch_participant(shared, data.guid, now);
                }
                self.resend_unreached(shared, data.guid, now);
            }
            ParticipantChange::Refreshed => self.resend_unreached(shared, data.guid, now),
            ParticipantChange::Restarted => {
                self.remove_participant(shared, data.guid, LossReason::Restarted);
            }
            ParticipantChange::Stale | ParticipantChange::Ignored => {}
        }
    }

    /// Answer a newcomer directly and replay local endpoint metadata to it.
    fn on_participant_added(&mut self, shared: &Shared, data: &ParticipantData, now: Instant) {
        let announcement = DiscoveryMessage::Participant(self.participant_data(shared));
        self.send_to_participant(shared, data.guid, announcement);

        let mut locals: Vec<_> = self
            .directory
            .view()
            .locals()
            .filter(|local| !local.deleting)
            .map(|local| (local.guid, local.sequence, local.to_data(shared.local)))
            .collect();
        locals.sort_by_key(|(_, sequence, _)| *sequence);
        for (guid, sequence, endpoint) in locals {
            self.send_reliable(
                shared,
                data.guid,
                guid,
                sequence,
                DiscoveryMessage::Endpoint(endpoint),
                now,
            );
        }

        if data.security_enabled {
            self.ensure_handshake(shared, data.guid, now);
        }
    }

    fn on_participant_disposed(&mut self, shared: &Shared, guid: GUID, sequence: u64) {
        let current = self
            .directory
            .view()
            .participant(&guid)
            .map(|record| record.sequence);
        match current {
            Some(current) if sequence >= current => {
                log::info!("[discovery] Participant {} disposed itself", guid);
                self.remove_participant(shared, guid, LossReason::Disposed);
            }
            Some(_) => log::debug!("[discovery] Stale disposal of {}", guid),
            None => {}
        }
    }

    fn on_endpoint(&mut self, shared: &Shared, data: EndpointData, now: Instant) {
        if data.participant == shared.local {
            return;
        }
        let (guid, owner, sequence) = (data.guid, data.participant, data.sequence);
        match self.directory.upsert_endpoint(&data, now) {
            Ok(EndpointChange::Ignored) => {
                self.acknowledge(shared, owner, sequence);
                // Moved onto an ignored topic
                self.drop_remote_endpoint(shared, guid);
            }
            Ok(change) => {
                self.acknowledge(shared, owner, sequence);
                if change.needs_matching() {
                    self.match_remote(shared, guid, now);
                }
            }
            Err(DirectoryError::UnknownParticipant(_)) => {
                // Not acknowledged: the owner resends once it is known here
                DiscoveryMetrics::bump(&shared.metrics.endpoints_rejected);
                log::debug!(
                    "[discovery] Endpoint {} from unknown participant {}",
                    guid,
                    owner
                );
            }
            Err(e) => {
                DiscoveryMetrics::bump(&shared.metrics.endpoints_rejected);
                log::debug!("[discovery] Rejected endpoint {}: {}", guid, e);
                self.acknowledge(shared, owner, sequence);
            }
        }
    }

    fn on_endpoint_disposed(&mut self, shared: &Shared, guid: GUID, participant: GUID, sequence: u64) {
        let view = self.directory.view();
        let owner_known = view
            .participant(&participant)
            .is_some_and(|record| !record.removing);
        if !owner_known {
            return;
        }
        let current = view.endpoint(&guid).map(|e| (e.participant, e.sequence));
        match current {
            Some((owner, current)) if owner == participant && sequence >= current => {
                self.drop_remote_endpoint(shared, guid);
                log::debug!("[discovery] Remote endpoint {} disposed", guid);
            }
            Some(_) | None => {}
        }
        self.acknowledge(shared, participant, sequence);
    }

    fn acknowledge(&self, shared: &Shared, participant: GUID, sequence: u64) {
        let ack = DiscoveryMessage::Ack {
            source: shared.local,
            destination: participant,
            sequence,
        };
        self.send_to_participant(shared, participant, ack);
    }

    fn on_fragment(
        &mut self,
        shared: &Shared,
        fragment: FragmentMessage,
        now: Instant,
        reassembled: &mut Vec<Vec<u8>>,
    ) {
        if fragment.writer == shared.local {
            return;
        }
        let key = FragmentKey::new(fragment.writer, fragment.sequence);
        match self
            .reassembler
            .insert_at(key, fragment.header, &fragment.payload, now)
        {
            ReassemblyResult::Complete(payload) => {
                DiscoveryMetrics::bump(&shared.metrics.fragments_completed);
                reassembled.push(payload);
            }
            ReassemblyResult::Rejected(_) => DiscoveryMetrics::bump(&shared.metrics.malformed),
            ReassemblyResult::Incomplete | ReassemblyResult::Duplicate => {}
        }
    }

    fn on_handshake(&mut self, shared: &Shared, message: HandshakeMessage, now: Instant) {
        if message.destination != shared.local {
            return;
        }
        let Some(gate) = self.gate.as_mut() else {
            log::debug!("[handshake] Security disabled, dropping {}", message.body.name());
            return;
        };
        let record = match self.directory.view().participant(&message.source) {
            Some(record) if !record.removing => record,
            _ => {
                log::debug!(
                    "[handshake] {} from unknown participant {}",
                    message.body.name(),
                    message.source
                );
                return;
            }
        };

        let mut effects = Vec::new();
        let peer = Peer {
            guid: record.guid,
            token: record.identity_token.as_ref(),
            sequence: record.sequence,
        };
        gate.on_message(peer, message.body, now, &mut effects);
        self.apply_gate_effects(shared, effects, now);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pair evaluation and association lifecycle transitions.

use super::state::{DomainState, Shared};
use crate::association::{AssociationKey, AssociationState, Begin, Establish, Teardown};
use crate::directory::{DirectoryError, LocalEndpoint};
use crate::events::{LossReason, Outbound, StatusEvent};
use crate::guid::{EndpointKind, GUID};
use crate::matching::{evaluate, Compatibility};
use crate::messages::DiscoveryMessage;
use crate::metrics::DiscoveryMetrics;
use crate::qos::QoS;
use crate::security::GateStatus;
use crate::transport::Direction;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

impl DomainState {
    /// Re-evaluate every pair involving remote endpoint `remote`.
    pub(crate) fn match_remote(&mut self, shared: &Shared, remote: GUID, now: Instant) {
        let mut locals: BTreeSet<GUID> = self
            .associations
            .keys_for_remote(remote)
            .into_iter()
            .map(|key| key.local)
            .collect();
        let view = self.directory.view();
        if let Some(endpoint) = view.endpoint(&remote) {
            locals.extend(view.locals_on_topic(&endpoint.topic_name).map(|l| l.guid));
        }
        for local in locals {
            self.evaluate_pair(shared, AssociationKey::new(local, remote), now);
        }
    }

    /// Re-evaluate every pair involving local endpoint `local`.
    pub(crate) fn match_local(&mut self, shared: &Shared, local: GUID, now: Instant) {
        let mut remotes: BTreeSet<GUID> = self
            .associations
            .keys_for_local(local)
            .into_iter()
            .map(|key| key.remote)
            .collect();
        let view = self.directory.view();
        if let Some(endpoint) = view.local(&local) {
            remotes.extend(view.find_by_topic(&endpoint.topic_name).map(|r| r.guid));
        }
        for remote in remotes {
            self.evaluate_pair(shared, AssociationKey::new(local, remote), now);
        }
    }

    /// Re-evaluate every endpoint of a participant (handshake block lifted).
    pub(crate) fn rematch_participant(&mut self, shared: &Shared, participant: GUID, now: Instant) {
        let remotes: Vec<GUID> = self
            .directory
            .view()
            .endpoints_of(&participant)
            .map(|endpoint| endpoint.guid)
            .collect();
        for remote in remotes {
            self.match_remote(shared, remote, now);
        }
    }

    /// Bring one pair in line with the directory: establish when compatible,
    /// tear down otherwise.
    pub(crate) fn evaluate_pair(&mut self, shared: &Shared, key: AssociationKey, now: Instant) {
        if self.directory.is_ignored(&key.remote) {
            self.teardown(shared, key);
            return;
        }
        let view = self.directory.view();
        let local = view.local(&key.local).filter(|l| !l.deleting).cloned();
        let remote = view
            .endpoint(&key.remote)
            .filter(|r| {
                view.participant(&r.participant)
                    .is_some_and(|owner| !owner.removing)
            })
            .cloned();
        let (Some(local), Some(remote)) = (local, remote) else {
            self.teardown(shared, key);
            return;
        };

        match evaluate(&*local, &*remote) {
            None => {
                shared.diagnostics.clear_pair(key.local, key.remote);
                self.teardown(shared, key);
            }
            Some(Compatibility::Compatible) => {
                shared.diagnostics.clear_pair(key.local, key.remote);
                self.establish(shared, &local, remote.participant, key, now);
            }
            Some(Compatibility::Incompatible(policies)) => {
                self.teardown(shared, key);
                if shared
                    .diagnostics
                    .record_incompatible(key.local, key.remote, &policies)
                {
                    DiscoveryMetrics::bump(&shared.metrics.incompatible_qos);
                    shared.status(StatusEvent::IncompatibleQos {
                        local: key.local,
                        remote: key.remote,
                        policies,
                    });
                }
            }
            Some(Compatibility::InconsistentType) => {
                self.teardown(shared, key);
                DiscoveryMetrics::bump(&shared.metrics.inconsistent_type);
                log::warn!(
                    "[MATCH-QOS] Inconsistent type on '{}': {} ({}) vs {} ({})",
                    local.topic_name,
                    key.local,
                    local.type_name,
                    key.remote,
                    remote.type_name
                );
                shared.status(StatusEvent::InconsistentType {
                    local: key.local,
                    remote: key.remote,
                });
            }
        }
    }

    fn establish(
        &mut self,
        shared: &Shared,
        local: &Arc<LocalEndpoint>,
        participant: GUID,
        key: AssociationKey,
        now: Instant,
    ) {
        if self.associations.get(&key).is_some() {
            // Associated: nothing to do. Disassociating: re-evaluated once
            // the removal has been delivered.
            return;
        }
        let secure = self.gate.is_some()
            && self
                .directory
                .view()
                .participant(&participant)
                .is_some_and(|owner| owner.security_enabled);

        let (establish, crypto) = if secure {
            match self.ensure_handshake(shared, participant, now) {
                Some(GateStatus::Validated(handle)) => (Establish::Secure, Some(handle)),
                Some(GateStatus::Pending) => (Establish::Secure, None),
                Some(GateStatus::Blocked) | None => {
                    log::debug!("[assoc] {} blocked by handshake with {}", key, participant);
                    return;
                }
            }
        } else {
            (Establish::Open, None)
        };

        let direction = match local.kind {
            EndpointKind::Writer => Direction::Outbound,
            EndpointKind::Reader => Direction::Inbound,
        };
        let data_path = local
            .data_path
            .clone()
            .unwrap_or_else(|| Arc::clone(&shared.data_path));

        match self.associations.begin(
            key,
            direction,
            Arc::clone(&data_path),
            establish,
            crypto.clone(),
            now,
        ) {
            Begin::Associated => {
                let secured = crypto.is_some();
                shared.outbound.push(Outbound::AddAssociation {
                    data_path,
                    local: key.local,
                    remote: key.remote,
                    direction,
                    crypto,
                });
                established(shared, key, secured);
            }
            Begin::Pending => log::debug!("[assoc] {} waiting for handshake", key),
            Begin::Exists(_) => {}
        }
    }

    /// Start tearing a pair down. No-op for unknown pairs.
    pub(crate) fn teardown(&mut self, shared: &Shared, key: AssociationKey) {
        match self.associations.begin_teardown(&key) {
            Some(Teardown::Detach(data_path)) => {
                shared.outbound.push(Outbound::RemoveAssociation {
                    data_path,
                    local: key.local,
                    remote: key.remote,
                });
                shared.outbound.push(Outbound::FinishDisassociation(key));
            }
            Some(Teardown::Dropped) | Some(Teardown::InProgress) | None => {}
        }
    }

    /// `remove_association` for `key` was delivered.
    pub(crate) fn finish_disassociation(&mut self, shared: &Shared, key: AssociationKey, now: Instant) {
        match self.associations.finish_teardown(&key) {
            Ok(_) => {
                DiscoveryMetrics::bump(&shared.metrics.associations_removed);
                log::info!("[assoc] Removed {}", key);
                shared.status(StatusEvent::AssociationRemoved {
                    local: key.local,
                    remote: key.remote,
                });
                // The pair may have become compatible again meanwhile
                self.evaluate_pair(shared, key, now);
            }
            Err(e) => self.invariant_violation(shared, key, e.to_string()),
        }
    }

    /// Fail closed for one pair after an impossible transition.
    pub(crate) fn invariant_violation(&mut self, shared: &Shared, key: AssociationKey, detail: String) {
        log::error!("[assoc] Invariant violation, abandoning {}: {}", key, detail);
        DiscoveryMetrics::bump(&shared.metrics.invariant_violations);
        if let Some(record) = self.associations.abandon(&key) {
            if record.state == AssociationState::Associated {
                shared.outbound.push(Outbound::RemoveAssociation {
                    data_path: record.data_path,
                    local: key.local,
                    remote: key.remote,
                });
            }
        }
        shared.status(StatusEvent::InvariantViolation { detail });
    }

    /// Phase one of participant removal. Associations are torn down, pending
    /// handshakes and retries cancelled; the record itself is purged after
    /// every queued `remove_association`.
    pub(crate) fn remove_participant(&mut self, shared: &Shared, guid: GUID, reason: LossReason) {
        let Some(endpoints) = self.directory.begin_participant_removal(&guid) else {
            return;
        };
        if let Some(gate) = self.gate.as_mut() {
            gate.cancel(guid);
        }
        self.outboxes.remove(&guid);
        self.unreached.remove(&guid);
        self.reassembler.remove_participant(&guid.prefix);

        for endpoint in &endpoints {
            shared.diagnostics.forget_remote(endpoint.guid);
            for key in self.associations.keys_for_remote(endpoint.guid) {
                self.teardown(shared, key);
            }
        }

        let counter = match reason {
            LossReason::LeaseExpired => &shared.metrics.participants_expired,
            _ => &shared.metrics.participants_removed,
        };
        DiscoveryMetrics::bump(counter);
        log::info!(
            "[discovery] Participant lost: {} ({:?}, {} endpoints)",
            guid,
            reason,
            endpoints.len()
        );
        shared.status(StatusEvent::ParticipantLost { guid, reason });
        shared.outbound.push(Outbound::PurgeParticipant(guid));
    }

    /// Send endpoint metadata to every live participant.
    fn announce_local(&mut self, shared: &Shared, endpoint: &LocalEndpoint, now: Instant) {
        let message = DiscoveryMessage::Endpoint(endpoint.to_data(shared.local));
        for participant in self.live_participants() {
            self.send_reliable(
                shared,
                participant,
                endpoint.guid,
                endpoint.sequence,
                message.clone(),
                now,
            );
        }
    }

    pub(crate) fn create_local(
        &mut self,
        shared: &Shared,
        mut endpoint: LocalEndpoint,
        now: Instant,
    ) -> Result<(), DirectoryError> {
        endpoint.sequence = self.next_metadata_sequence();
        let endpoint = self.directory.add_local(endpoint)?;
        log::info!(
            "[discovery] Local {} {} on '{}'",
            endpoint.kind,
            endpoint.guid,
            endpoint.topic_name
        );
        self.announce_local(shared, &endpoint, now);
        // Participants that have not heard of us yet learn about the new
        // endpoint once they discover this participant
        self.announce.trigger(now);
        self.match_local(shared, endpoint.guid, now);
        Ok(())
    }

    pub(crate) fn update_local_qos(
        &mut self,
        shared: &Shared,
        guid: GUID,
        qos: QoS,
        now: Instant,
    ) -> Result<(), DirectoryError> {
        let sequence = self.next_metadata_sequence();
        let endpoint = self.directory.update_local_qos(&guid, qos, sequence)?;
        log::debug!("[discovery] QoS of local {} changed (seq {})", guid, sequence);
        self.announce_local(shared, &endpoint, now);
        self.match_local(shared, guid, now);
        Ok(())
    }

    /// Phase one of local endpoint deletion.
    pub(crate) fn delete_local(
        &mut self,
        shared: &Shared,
        guid: GUID,
        now: Instant,
    ) -> Result<(), DirectoryError> {
        self.directory.begin_local_deletion(&guid)?;
        for key in self.associations.keys_for_local(guid) {
            self.teardown(shared, key);
        }
        shared.diagnostics.forget_local(guid);

        let sequence = self.next_metadata_sequence();
        let message = DiscoveryMessage::EndpointDisposed {
            guid,
            participant: shared.local,
            sequence,
        };
        for participant in self.live_participants() {
            self.send_reliable(shared, participant, guid, sequence, message.clone(), now);
        }
        log::info!("[discovery] Local endpoint {} deleted", guid);
        shared.outbound.push(Outbound::PurgeLocal(guid));
        Ok(())
    }
}

pub(crate) fn established(shared: &Shared, key: AssociationKey, secured: bool) {
    DiscoveryMetrics::bump(&shared.metrics.associations_established);
    log::info!("[assoc] Associated {} (secured: {})", key, secured);
    shared.status(StatusEvent::AssociationEstablished {
        local: key.local,
        remote: key.remote,
        secured,
    });
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Glue between the security gate and the association table.

use super::matching::established;
use super::state::{DomainState, Shared};
use crate::association::Teardown;
use crate::events::{Outbound, StatusEvent};
use crate::guid::GUID;
use crate::messages::{DiscoveryMessage, HandshakeMessage};
use crate::metrics::DiscoveryMetrics;
use crate::security::{CryptoOutcome, GateEffect, GateStatus, Peer};
use std::sync::Arc;
use std::time::Instant;

impl DomainState {
    /// Gate status for `participant`, starting a handshake if needed.
    ///
    /// `None` when security is off or the participant is unknown.
    pub(crate) fn ensure_handshake(
        &mut self,
        shared: &Shared,
        participant: GUID,
        now: Instant,
    ) -> Option<GateStatus> {
        let gate = self.gate.as_mut()?;
        let record = self
            .directory
            .view()
            .participant(&participant)
            .filter(|record| !record.removing)?;
        let mut effects = Vec::new();
        let status = gate.ensure_session(
            Peer {
                guid: record.guid,
                token: record.identity_token.as_ref(),
                sequence: record.sequence,
            },
            now,
            &mut effects,
        );
        self.apply_gate_effects(shared, effects, now);
        Some(status)
    }

    /// Result of an off-lock crypto step.
    pub(crate) fn apply_crypto_outcome(
        &mut self,
        shared: &Shared,
        outcome: CryptoOutcome,
        now: Instant,
    ) {
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        let mut effects = Vec::new();
        gate.apply(outcome, now, &mut effects);
        self.apply_gate_effects(shared, effects, now);
    }

    pub(crate) fn apply_gate_effects(
        &mut self,
        shared: &Shared,
        effects: Vec<GateEffect>,
        now: Instant,
    ) {
        for effect in effects {
            match effect {
                GateEffect::Send { remote, body } => {
                    let message = DiscoveryMessage::Handshake(HandshakeMessage {
                        source: shared.local,
                        destination: remote,
                        body,
                    });
                    self.send_to_participant(shared, remote, message);
                }
                GateEffect::Run(job) => shared.outbound.push(Outbound::Crypto(job)),
                GateEffect::Validated { remote, handle } => {
                    DiscoveryMetrics::bump(&shared.metrics.handshakes_validated);
                    log::info!("[handshake] Validated {} ({:?})", remote, handle);
                    for key in self.associations.pending_for_participant(remote) {
                        let completed = self
                            .associations
                            .complete_security(&key, handle.clone())
                            .map(|record| (Arc::clone(&record.data_path), record.direction));
                        match completed {
                            Ok((data_path, direction)) => {
                                shared.outbound.push(Outbound::AddAssociation {
                                    data_path,
                                    local: key.local,
                                    remote: key.remote,
                                    direction,
                                    crypto: Some(handle.clone()),
                                });
                                established(shared, key, true);
                            }
                            Err(e) => self.invariant_violation(shared, key, e.to_string()),
                        }
                    }
                    // Pairs dropped while the participant was blocked
                    self.rematch_participant(shared, remote, now);
                }
                GateEffect::Rejected { remote, error } => {
                    DiscoveryMetrics::bump(&shared.metrics.security_errors);
                    for key in self.associations.pending_for_participant(remote) {
                        if let Some(Teardown::Dropped) = self.associations.begin_teardown(&key) {
                            log::debug!("[assoc] {} dropped after rejected handshake", key);
                        }
                    }
                    shared.status(StatusEvent::HandshakeRejected { remote, error });
                }
            }
        }
    }
}

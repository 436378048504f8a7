// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic work: lease expiry, announcements, retries, handshake deadlines.

use super::state::{DomainState, Shared};
use crate::events::{LossReason, StatusEvent};
use crate::guid::GUID;
use crate::messages::DiscoveryMessage;
use crate::metrics::DiscoveryMetrics;
use crate::scheduler::expired_participants;
use std::time::Instant;

impl DomainState {
    pub(crate) fn on_tick(&mut self, shared: &Shared, now: Instant) {
        crate::trace_fn!("DomainState::on_tick");

        for guid in expired_participants(&self.directory.view(), now) {
            log::warn!("[lease] Participant {} lease expired", guid);
            self.remove_participant(shared, guid, LossReason::LeaseExpired);
        }

        if self.announce.poll(now) {
            self.announce_participant(shared);
        }

        self.poll_outboxes(shared, now);

        let relay_due = match self.relay.as_mut() {
            Some(relay) => relay.poll(now).then(|| relay.locator()),
            None => None,
        };
        if let Some(locator) = relay_due {
            let message = DiscoveryMessage::Participant(self.participant_data(shared));
            shared.transmit(locator, message);
        }

        if let Some(gate) = self.gate.as_mut() {
            let mut effects = Vec::new();
            gate.on_tick(now, &mut effects);
            self.apply_gate_effects(shared, effects, now);
        }

        let evicted = self.reassembler.evict_expired(now);
        if !evicted.is_empty() {
            log::debug!("[FragBuf] Evicted {} stale reassemblies", evicted.len());
        }
    }

    fn poll_outboxes(&mut self, shared: &Shared, now: Instant) {
        let mut abandoned = Vec::new();
        let mut resends = Vec::new();
        for (participant, outbox) in &mut self.outboxes {
            for message in outbox.poll(now, &mut abandoned) {
                resends.push((*participant, message));
            }
        }
        self.outboxes.retain(|_, outbox| !outbox.is_empty());

        for (participant, message) in resends {
            DiscoveryMetrics::bump(&shared.metrics.retries_sent);
            self.send_to_participant(shared, participant, message);
        }
        for entry in abandoned {
            DiscoveryMetrics::bump(&shared.metrics.retries_abandoned);
            log::warn!(
                "[retry] Gave up delivering {} (seq {}) to {}",
                entry.subject,
                entry.sequence,
                entry.destination
            );
            shared.status(StatusEvent::RetryAbandoned {
                destination: entry.destination,
                subject: entry.subject,
                sequence: entry.sequence,
            });
            let stalled = self.unreached.entry(entry.destination).or_default();
            let newer = stalled
                .get(&entry.subject)
                .map_or(true, |(sequence, _)| *sequence < entry.sequence);
            if newer {
                stalled.insert(entry.subject, (entry.sequence, entry.message));
            }
        }
    }

    /// `participant` was heard from again: resend metadata it never
    /// acknowledged. Live local endpoints go out with their current data.
    pub(crate) fn resend_unreached(&mut self, shared: &Shared, participant: GUID, now: Instant) {
        let Some(stalled) = self.unreached.remove(&participant) else {
            return;
        };
        log::info!(
            "[retry] {} is reachable again, resending {} abandoned messages",
            participant,
            stalled.len()
        );
        for (subject, (sequence, message)) in stalled {
            let live = self
                .directory
                .view()
                .local(&subject)
                .filter(|local| !local.deleting)
                .cloned();
            match (live, message) {
                (Some(local), _) => {
                    let data = DiscoveryMessage::Endpoint(local.to_data(shared.local));
                    self.send_reliable(shared, participant, subject, local.sequence, data, now);
                }
                (None, message @ DiscoveryMessage::EndpointDisposed { .. }) => {
                    self.send_reliable(shared, participant, subject, sequence, message, now);
                }
                // Announcement of an endpoint deleted since
                (None, _) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::directory::LocalEndpoint;
    use crate::events::{Outbound, OutboundQueue};
    use crate::matching::QosDiagnostics;
    use crate::messages::ParticipantData;
    use crate::qos::QoS;
    use crate::security::CryptoHandle;
    use crate::transport::{DataPath, Direction, Locator};
    use std::sync::Arc;
    use std::time::Duration;

    const LOCAL: [u8; 12] = [0xAA; 12];

    struct NullPath;

    impl DataPath for NullPath {
        fn add_association(&self, _: GUID, _: GUID, _: Direction, _: Option<CryptoHandle>) {}
        fn remove_association(&self, _: GUID, _: GUID) {}
    }

    fn shared(config: DiscoveryConfig) -> Shared {
        Shared {
            local: GUID::participant(LOCAL),
            config,
            data_path: Arc::new(NullPath),
            outbound: OutboundQueue::new(),
            metrics: Arc::new(DiscoveryMetrics::new()),
            diagnostics: QosDiagnostics::new(),
        }
    }

    /// Drain the queue, keeping what would have been transmitted.
    fn sent(shared: &Shared) -> Vec<(Locator, DiscoveryMessage)> {
        let mut out = Vec::new();
        while let Some(event) = shared.outbound.pop() {
            if let Outbound::Transmit {
                destination,
                message,
            } = event
            {
                out.push((destination, message));
            }
        }
        out
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_tick_refreshes_relay_on_backoff() {
        let relay: Locator = "10.0.0.9:7400".parse().unwrap();
        let config = DiscoveryConfig::builder()
            .multicast_group(None)
            .relay(relay)
            .build()
            .unwrap();
        let shared = shared(config);
        let mut state = DomainState::new(&shared, None, 1);
        let start = Instant::now();

        state.on_tick(&shared, start);
        let first = sent(&shared);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, relay);
        assert!(matches!(&first[0].1, DiscoveryMessage::Participant(data) if data.guid == shared.local));

        state.on_tick(&shared, start + ms(50));
        assert!(sent(&shared).is_empty());
        state.on_tick(&shared, start + ms(100));
        assert_eq!(sent(&shared).len(), 1);

        // Traffic from the relay restarts the backoff at its initial interval
        for step in [200, 400, 700] {
            state.on_tick(&shared, start + ms(step));
        }
        sent(&shared);
        if let Some(refresh) = state.relay.as_mut() {
            assert!(refresh.on_datagram(relay, start + ms(710)));
        }
        state.on_tick(&shared, start + ms(810));
        assert_eq!(sent(&shared).len(), 1);
    }

    #[test]
    fn test_abandoned_metadata_resent_with_current_data() {
        let shared = shared(DiscoveryConfig::builder().multicast_group(None).build().unwrap());
        let mut state = DomainState::new(&shared, None, 1);
        let start = Instant::now();

        let peer_locator: Locator = "10.0.0.2:7400".parse().unwrap();
        let peer = ParticipantData {
            guid: GUID::participant([2; 12]),
            domain_id: 0,
            incarnation: 1,
            sequence: 1,
            lease_duration: Duration::from_secs(120),
            locators: vec![peer_locator],
            security_enabled: false,
            identity_token: None,
        };
        state.directory.upsert_participant(&peer, start);

        let writer = GUID::new(LOCAL, [0, 0, 1, 0x02]);
        state
            .create_local(
                &shared,
                LocalEndpoint::writer(writer, "T", "Temp", QoS::reliable()),
                start,
            )
            .unwrap();
        sent(&shared);

        // Never acknowledged within the 30 s deadline
        state.on_tick(&shared, start + Duration::from_secs(30));
        sent(&shared);
        assert!(state.outboxes.is_empty());
        assert_eq!(state.unreached[&peer.guid].len(), 1);

        state.resend_unreached(&shared, peer.guid, start + Duration::from_secs(31));
        let resent = sent(&shared);
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].0, peer_locator);
        assert!(matches!(&resent[0].1, DiscoveryMessage::Endpoint(data) if data.guid == writer));
        assert!(state.outboxes.contains_key(&peer.guid));
        assert!(!state.unreached.contains_key(&peer.guid));

        // Nothing left to resend
        state.resend_unreached(&shared, peer.guid, start + Duration::from_secs(32));
        assert!(sent(&shared).is_empty());
    }
}

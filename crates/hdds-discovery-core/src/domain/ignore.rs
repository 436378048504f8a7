// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-requested ignores.
//!
//! Ignoring tears down what already exists through the usual two-phase
//! paths, then the directory drops every later announcement of the entity.

use super::state::{DomainState, Shared};
use crate::directory::DirectoryError;
use crate::events::LossReason;
use crate::guid::{EndpointKind, GUID};

impl DomainState {
    pub(crate) fn ignore_participant(&mut self, shared: &Shared, guid: GUID) -> Result<(), DirectoryError> {
        if !guid.is_participant() {
            return Err(DirectoryError::KindMismatch(guid));
        }
        if self.directory.ignore(guid)? {
            log::info!("[discovery] Ignoring participant {}", guid);
        }
        self.remove_participant(shared, guid, LossReason::Ignored);
        Ok(())
    }

    pub(crate) fn ignore_endpoint(
        &mut self,
        shared: &Shared,
        guid: GUID,
        kind: EndpointKind,
    ) -> Result<(), DirectoryError> {
        let known_kind = self.directory.view().endpoint(&guid).map(|e| e.kind);
        if guid.is_participant()
            || guid.endpoint_kind().is_some_and(|k| k != kind)
            || known_kind.is_some_and(|k| k != kind)
        {
            return Err(DirectoryError::KindMismatch(guid));
        }
        if self.directory.ignore(guid)? {
            log::info!("[discovery] Ignoring {} {}", kind, guid);
        }
        self.drop_remote_endpoint(shared, guid);
        Ok(())
    }

    pub(crate) fn ignore_topic(&mut self, shared: &Shared, topic_name: &str) {
        if self.directory.ignore_topic(topic_name) {
            log::info!("[discovery] Ignoring topic '{}'", topic_name);
        }
        let mut remotes: Vec<GUID> = self
            .directory
            .view()
            .find_by_topic(topic_name)
            .map(|endpoint| endpoint.guid)
            .collect();
        remotes.sort();
        for guid in remotes {
            self.drop_remote_endpoint(shared, guid);
        }
    }

    /// Tear down every association with remote endpoint `guid` and forget it.
    pub(crate) fn drop_remote_endpoint(&mut self, shared: &Shared, guid: GUID) {
        for key in self.associations.keys_for_remote(guid) {
            self.teardown(shared, key);
        }
        self.directory.remove_endpoint(&guid);
        shared.diagnostics.forget_remote(guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationState;
    use crate::config::DiscoveryConfig;
    use crate::directory::{EndpointChange, LocalEndpoint, ParticipantChange};
    use crate::events::{Outbound, OutboundQueue};
    use crate::matching::QosDiagnostics;
    use crate::messages::{EndpointData, ParticipantData};
    use crate::metrics::DiscoveryMetrics;
    use crate::qos::QoS;
    use crate::security::CryptoHandle;
    use crate::transport::{DataPath, Direction};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const LOCAL: [u8; 12] = [0xAA; 12];

    struct NullPath;

    impl DataPath for NullPath {
        fn add_association(&self, _: GUID, _: GUID, _: Direction, _: Option<CryptoHandle>) {}
        fn remove_association(&self, _: GUID, _: GUID) {}
    }

    fn shared() -> Shared {
        Shared {
            local: GUID::participant(LOCAL),
            config: DiscoveryConfig::builder().multicast_group(None).build().unwrap(),
            data_path: Arc::new(NullPath),
            outbound: OutboundQueue::new(),
            metrics: Arc::new(DiscoveryMetrics::new()),
            diagnostics: QosDiagnostics::new(),
        }
    }

    /// Run the deferred steps the domain would run after releasing its lock.
    fn settle(state: &mut DomainState, shared: &Shared, now: Instant) {
        while let Some(event) = shared.outbound.pop() {
            match event {
                Outbound::FinishDisassociation(key) => state.finish_disassociation(shared, key, now),
                Outbound::PurgeParticipant(guid) => {
                    state.directory.purge_participant(&guid, now);
                }
                _ => {}
            }
        }
    }

    fn peer(prefix: u8, sequence: u64) -> ParticipantData {
        ParticipantData {
            guid: GUID::participant([prefix; 12]),
            domain_id: 0,
            incarnation: 1,
            sequence,
            lease_duration: Duration::from_secs(60),
            locators: vec![],
            security_enabled: false,
            identity_token: None,
        }
    }

    fn remote_reader(prefix: u8, id: u8, topic: &str) -> EndpointData {
        let guid = GUID::new([prefix; 12], [0, 0, id, 0x07]);
        EndpointData {
            guid,
            participant: guid.participant_guid(),
            kind: EndpointKind::Reader,
            topic_name: topic.to_string(),
            type_name: "Temp".to_string(),
            qos: QoS::reliable(),
            locators: vec![],
            sequence: 1,
        }
    }

    /// Local writers on "T" and "U", remote participant 2 with a reader on each.
    fn associated(shared: &Shared, now: Instant) -> (DomainState, [EndpointData; 2]) {
        let mut state = DomainState::new(shared, None, 1);
        for (id, topic) in [(1, "T"), (2, "U")] {
            let writer = GUID::new(LOCAL, [0, 0, id, 0x02]);
            state
                .create_local(shared, LocalEndpoint::writer(writer, topic, "Temp", QoS::reliable()), now)
                .unwrap();
        }
        state.directory.upsert_participant(&peer(2, 1), now);
        let readers = [remote_reader(2, 1, "T"), remote_reader(2, 2, "U")];
        for reader in &readers {
            state.directory.upsert_endpoint(reader, now).unwrap();
            state.match_remote(shared, reader.guid, now);
        }
        settle(&mut state, shared, now);
        assert_eq!(state.associations.count_in(AssociationState::Associated), 2);
        (state, readers)
    }

    #[test]
    fn test_ignored_participant_is_removed_and_stays_out() {
        let shared = shared();
        let now = Instant::now();
        let (mut state, _) = associated(&shared, now);
        let guid = GUID::participant([2; 12]);

        state.ignore_participant(&shared, guid).unwrap();
        settle(&mut state, &shared, now);
        assert_eq!(state.associations.count_in(AssociationState::Associated), 0);
        assert!(state.directory.view().participant(&guid).is_none());

        assert_eq!(
            state.directory.upsert_participant(&peer(2, 2), now),
            ParticipantChange::Ignored
        );
        assert!(state
            .ignore_participant(&shared, GUID::new([2; 12], [0, 0, 1, 0x07]))
            .is_err());
        assert!(state.ignore_participant(&shared, GUID::participant(LOCAL)).is_err());
    }

    #[test]
    fn test_ignored_endpoint_and_topic() {
        let shared = shared();
        let now = Instant::now();
        let (mut state, [reader_t, reader_u]) = associated(&shared, now);
        let (on_t, on_u) = (reader_t.guid, reader_u.guid);

        assert!(matches!(
            state.ignore_endpoint(&shared, on_t, EndpointKind::Writer),
            Err(DirectoryError::KindMismatch(_))
        ));
        state.ignore_endpoint(&shared, on_t, EndpointKind::Reader).unwrap();
        settle(&mut state, &shared, now);
        assert!(state.associations.matched_locals(on_t).is_empty());
        assert!(state.directory.view().endpoint(&on_t).is_none());
        assert_eq!(state.associations.matched_locals(on_u).len(), 1);

        // Re-announcing the ignored reader does not bring it back
        assert_eq!(
            state.directory.upsert_endpoint(&reader_t, now),
            Ok(EndpointChange::Ignored)
        );

        state.ignore_topic(&shared, "U");
        settle(&mut state, &shared, now);
        assert_eq!(state.associations.count_in(AssociationState::Associated), 0);
        assert_eq!(state.directory.view().endpoint_count(), 0);
        assert!(state.directory.is_topic_ignored("U"));
        assert_eq!(
            state.directory.upsert_endpoint(&reader_u, now),
            Ok(EndpointChange::Ignored)
        );
    }
}

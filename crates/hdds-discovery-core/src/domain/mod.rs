// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery domain orchestrator.
//!
//! One `DiscoveryDomain` per participant. It owns the directory, the
//! association table, the security gate and the schedulers behind a single
//! reentrant lock, and exposes the entry points collaborators call:
//!
//! - [`on_datagram_received`](DiscoveryDomain::on_datagram_received) from the transport
//! - `on_local_endpoint_*` and `on_ignore_*` from the application
//! - [`on_tick`](DiscoveryDomain::on_tick) from the scheduler timer
//!
//! # Locking
//!
//! Every entry point takes the lock, applies state transitions, publishes
//! the directory snapshot and releases the lock. Transitions never call a
//! collaborator; they push [`Outbound`] events which are drained afterwards,
//! outside the lock. Only one thread drains at a time; a collaborator that
//! calls back into the domain from inside the drain (a loopback transport,
//! say) leaves its events to the thread already draining.
//!
//! Time-dependent entry points have an `*_at(now)` form so tests can drive
//! the domain without sleeping.

mod handshake;
mod ignore;
mod inbound;
mod matching;
mod state;
mod tick;

use crate::association::{AssociationKey, AssociationState};
use crate::config::DiscoveryConfig;
use crate::directory::{DirectoryView, LocalEndpoint, ParticipantLiveliness};
use crate::error::{Error, Result};
use crate::events::{Outbound, OutboundQueue, StatusChannel, StatusEvent};
use crate::fragment;
use crate::guid::{EndpointKind, GUID};
use crate::matching::{IncompatibleQosStatus, QosDiagnostics};
use crate::messages::{DiscoveryMessage, FragmentMessage};
use crate::metrics::{DiscoveryMetrics, MetricsSnapshot};
use crate::qos::QoS;
use crate::security::{Authenticator, HandshakeState, SecurityGate};
use crate::transport::{DataPath, Locator, Transport, WireCodec};
use arc_swap::ArcSwap;
use crossbeam::channel::Receiver;
use parking_lot::{Mutex, ReentrantMutex};
use state::{DomainState, Shared};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Discovery state machine for one local participant.
pub struct DiscoveryDomain {
    shared: Shared,
    state: ReentrantMutex<RefCell<DomainState>>,
    /// Held by the thread currently draining the outbound queue
    drain_lock: Mutex<()>,
    status: StatusChannel,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn WireCodec>,
    authenticator: Option<Arc<dyn Authenticator>>,
    view: Arc<ArcSwap<DirectoryView>>,
    fragment_sequence: AtomicU64,
}

impl DiscoveryDomain {
    /// Start building the domain of local participant `participant`.
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use hdds_discovery_core::transport::{DataPath, Transport};
    /// # fn collaborators() -> (Arc<dyn Transport>, Arc<dyn DataPath>) { unimplemented!() }
    /// use hdds_discovery_core::{DiscoveryConfig, DiscoveryDomain, JsonCodec, GUID};
    ///
    /// let (transport, data_path) = collaborators();
    /// let domain = DiscoveryDomain::builder(GUID::participant([1; 12]), DiscoveryConfig::default())
    ///     .transport(transport)
    ///     .data_path(data_path)
    ///     .codec(Arc::new(JsonCodec::new()))
    ///     .build()?;
    /// # Ok::<(), hdds_discovery_core::Error>(())
    /// ```
    pub fn builder(participant: GUID, config: DiscoveryConfig) -> DiscoveryDomainBuilder {
        DiscoveryDomainBuilder {
            participant,
            config,
            transport: None,
            data_path: None,
            codec: None,
            authenticator: None,
            incarnation: None,
        }
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Inbound datagram from the transport. Never fails: malformed input is
    /// dropped, logged and counted.
    pub fn on_datagram_received(&self, source: Locator, bytes: &[u8]) {
        self.on_datagram_received_at(source, bytes, Instant::now());
    }

    pub fn on_datagram_received_at(&self, source: Locator, bytes: &[u8], now: Instant) {
        crate::trace_fn!("DiscoveryDomain::on_datagram_received");
        DiscoveryMetrics::bump(&self.shared.metrics.datagrams_received);

        let messages = self.decode(source, bytes);
        let mut reassembled = Vec::new();
        self.with_state(now, |state, shared| {
            if let Some(relay) = state.relay.as_mut() {
                relay.on_datagram(source, now);
            }
            for message in messages {
                state.handle_message(shared, message, now, &mut reassembled);
            }
        });

        // Reassembled payloads are decoded outside the lock
        while !reassembled.is_empty() {
            for payload in std::mem::take(&mut reassembled) {
                let messages = self.decode(source, &payload);
                if messages.is_empty() {
                    continue;
                }
                self.with_state(now, |state, shared| {
                    for message in messages {
                        state.handle_message(shared, message, now, &mut reassembled);
                    }
                });
            }
        }
    }

    /// Register a local writer or reader, announce it and match it.
    ///
    /// Fails for a GUID outside the local participant, a GUID already in use,
    /// or a kind contradicting the GUID's entity id.
    pub fn on_local_endpoint_created(&self, endpoint: LocalEndpoint) -> Result<()> {
        self.on_local_endpoint_created_at(endpoint, Instant::now())
    }

    pub fn on_local_endpoint_created_at(&self, endpoint: LocalEndpoint, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| state.create_local(shared, endpoint, now))
            .map_err(Error::from)
    }

    /// Delete a local endpoint. Its associations are removed through the data
    /// path before the endpoint is forgotten.
    pub fn on_local_endpoint_deleted(&self, guid: GUID) -> Result<()> {
        self.on_local_endpoint_deleted_at(guid, Instant::now())
    }

    pub fn on_local_endpoint_deleted_at(&self, guid: GUID, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| state.delete_local(shared, guid, now))
            .map_err(Error::from)
    }

    /// Replace the QoS of a local endpoint and re-evaluate its pairs.
    pub fn on_local_endpoint_qos_changed(&self, guid: GUID, qos: QoS) -> Result<()> {
        self.on_local_endpoint_qos_changed_at(guid, qos, Instant::now())
    }

    pub fn on_local_endpoint_qos_changed_at(&self, guid: GUID, qos: QoS, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| state.update_local_qos(shared, guid, qos, now))
            .map_err(Error::from)
    }

    /// Drop remote participant `guid` and everything it owns, and ignore its
    /// announcements from now on. Fails for the local participant or an
    /// endpoint GUID.
    pub fn on_ignore_participant(&self, guid: GUID) -> Result<()> {
        self.on_ignore_participant_at(guid, Instant::now())
    }

    pub fn on_ignore_participant_at(&self, guid: GUID, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| state.ignore_participant(shared, guid))
            .map_err(Error::from)
    }

    /// Ignore remote writer `guid`.
    pub fn on_ignore_publication(&self, guid: GUID) -> Result<()> {
        self.on_ignore_publication_at(guid, Instant::now())
    }

    pub fn on_ignore_publication_at(&self, guid: GUID, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| {
            state.ignore_endpoint(shared, guid, EndpointKind::Writer)
        })
        .map_err(Error::from)
    }

    /// Ignore remote reader `guid`.
    pub fn on_ignore_subscription(&self, guid: GUID) -> Result<()> {
        self.on_ignore_subscription_at(guid, Instant::now())
    }

    pub fn on_ignore_subscription_at(&self, guid: GUID, now: Instant) -> Result<()> {
        self.with_state(now, |state, shared| {
            state.ignore_endpoint(shared, guid, EndpointKind::Reader)
        })
        .map_err(Error::from)
    }

    /// Ignore every remote endpoint on `topic_name`. Local endpoints on the
    /// topic are unaffected.
    pub fn on_ignore_topic(&self, topic_name: &str) {
        self.on_ignore_topic_at(topic_name, Instant::now());
    }

    pub fn on_ignore_topic_at(&self, topic_name: &str, now: Instant) {
        self.with_state(now, |state, shared| state.ignore_topic(shared, topic_name));
    }

    /// Scheduler tick: lease expiry, announcements, retries, handshake
    /// deadlines, stale fragment sets.
    pub fn on_tick(&self) {
        self.on_tick_at(Instant::now());
    }

    pub fn on_tick_at(&self, now: Instant) {
        self.with_state(now, |state, shared| state.on_tick(shared, now));
    }

    /// Tell peers this participant is leaving.
    pub fn dispose(&self) {
        self.dispose_at(Instant::now());
    }

    pub fn dispose_at(&self, now: Instant) {
        self.with_state(now, |state, shared| {
            let message = DiscoveryMessage::ParticipantDisposed {
                guid: shared.local,
                sequence: state.announcement_sequence,
            };
            let mut targets: BTreeSet<Locator> = shared
                .config
                .multicast_group
                .iter()
                .chain(shared.config.initial_peers.iter())
                .chain(shared.config.relay.iter())
                .copied()
                .collect();
            for participant in state.live_participants() {
                if let Some(locator) = state.destination(shared, participant) {
                    targets.insert(locator);
                }
            }
            log::info!("[discovery] Disposing {} ({} targets)", shared.local, targets.len());
            for destination in targets {
                shared.transmit(destination, message.clone());
            }
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Remote endpoints currently associated with local endpoint `local`.
    pub fn matched_remote_endpoints(&self, local: GUID) -> BTreeSet<GUID> {
        self.locked(|state, _| state.associations.matched_remotes(local))
            .into_iter()
            .collect()
    }

    /// Local endpoints currently associated with remote endpoint `remote`.
    pub fn matched_local_endpoints(&self, remote: GUID) -> BTreeSet<GUID> {
        self.locked(|state, _| state.associations.matched_locals(remote))
            .into_iter()
            .collect()
    }

    pub fn association_state(&self, local: GUID, remote: GUID) -> Option<AssociationState> {
        self.locked(|state, _| state.associations.state(&AssociationKey::new(local, remote)))
    }

    /// Number of association records in `association_state`.
    pub fn association_count(&self, association_state: AssociationState) -> usize {
        self.locked(|state, _| state.associations.count_in(association_state))
    }

    pub fn participant_liveliness(&self, participant: GUID) -> ParticipantLiveliness {
        self.locked(|state, _| state.directory.liveliness(&participant))
    }

    /// Handshake progress with a remote participant, `None` when security is
    /// disabled or no handshake was attempted.
    pub fn handshake_state(&self, participant: GUID) -> Option<HandshakeState> {
        self.locked(|state, _| state.gate.as_ref().and_then(|gate| gate.state(participant)))
    }

    /// Incompatible-QoS status of a local endpoint. Resets its
    /// `total_count_change`.
    pub fn incompatible_qos_status(&self, local: GUID) -> IncompatibleQosStatus {
        self.shared.diagnostics.take_status(local)
    }

    /// Latest published directory snapshot. Does not take the domain lock.
    pub fn directory(&self) -> Arc<DirectoryView> {
        self.view.load_full()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Receiver for status events. Clones share one queue.
    pub fn status_events(&self) -> Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub fn guid(&self) -> GUID {
        self.shared.local
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.shared.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn metrics_handle(&self) -> &Arc<DiscoveryMetrics> {
        &self.shared.metrics
    }

    // ------------------------------------------------------------------
    // Lock and drain
    // ------------------------------------------------------------------

    /// Run `f` under the lock, then drain the outbound queue.
    fn with_state<T>(&self, now: Instant, f: impl FnOnce(&mut DomainState, &Shared) -> T) -> T {
        let result = self.locked(f);
        self.drain(now);
        result
    }

    /// Run `f` under the lock and publish the directory. Does not drain.
    fn locked<T>(&self, f: impl FnOnce(&mut DomainState, &Shared) -> T) -> T {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let result = f(&mut *state, &self.shared);
        state.directory.publish();
        result
    }

    fn drain(&self, now: Instant) {
        loop {
            let Some(guard) = self.drain_lock.try_lock() else {
                return;
            };
            while let Some(event) = self.shared.outbound.pop() {
                self.dispatch(event, now);
            }
            drop(guard);
            // Events pushed by a thread that found the drain busy
            if self.shared.outbound.is_empty() {
                return;
            }
        }
    }

    fn dispatch(&self, event: Outbound, now: Instant) {
        log::trace!("[discovery] Dispatch {}", event.name());
        match event {
            Outbound::Transmit {
                destination,
                message,
            } => self.transmit(destination, &message),
            Outbound::AddAssociation {
                data_path,
                local,
                remote,
                direction,
                crypto,
            } => data_path.add_association(local, remote, direction, crypto),
            Outbound::RemoveAssociation {
                data_path,
                local,
                remote,
            } => data_path.remove_association(local, remote),
            Outbound::FinishDisassociation(key) => {
                self.locked(|state, shared| state.finish_disassociation(shared, key, now));
            }
            Outbound::PurgeParticipant(guid) => {
                self.locked(|state, _| {
                    if state.directory.purge_participant(&guid, now) {
                        log::debug!("[directory] Purged participant {}", guid);
                    }
                });
            }
            Outbound::PurgeLocal(guid) => {
                self.locked(|state, _| {
                    if state.directory.purge_local(&guid) {
                        log::debug!("[directory] Purged local endpoint {}", guid);
                    }
                });
            }
            Outbound::Crypto(job) => {
                let Some(authenticator) = self.authenticator.as_ref() else {
                    return;
                };
                let outcome = job.run(authenticator.as_ref());
                self.locked(|state, shared| state.apply_crypto_outcome(shared, outcome, now));
            }
            Outbound::Status(event) => {
                if !self.status.publish(event) {
                    DiscoveryMetrics::bump(&self.shared.metrics.status_dropped);
                }
            }
        }
    }

    fn decode(&self, source: Locator, bytes: &[u8]) -> Vec<DiscoveryMessage> {
        match self.codec.decode(bytes) {
            Ok(messages) => messages,
            Err(e) => {
                DiscoveryMetrics::bump(&self.shared.metrics.malformed);
                DiscoveryMetrics::bump(&self.shared.metrics.codec_errors);
                log::debug!(
                    "[discovery] Dropping {} byte datagram from {}: {}",
                    bytes.len(),
                    source,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Encode and send, fragmenting above `max_datagram_size`.
    fn transmit(&self, destination: Locator, message: &DiscoveryMessage) {
        let Some(bytes) = self.encode(message) else {
            return;
        };
        if bytes.len() <= self.shared.config.max_datagram_size {
            self.send_datagram(destination, &bytes);
            return;
        }

        let sequence = self.fragment_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let pieces = fragment::split(&bytes, self.shared.config.fragments.fragment_payload);
        log::debug!(
            "[discovery] {} of {} bytes sent as {} fragments",
            message.kind_name(),
            bytes.len(),
            pieces.len()
        );
        for (header, payload) in pieces {
            let fragment = DiscoveryMessage::Fragment(FragmentMessage {
                writer: self.shared.local,
                sequence,
                header,
                payload: payload.to_vec(),
            });
            match self.encode(&fragment) {
                Some(bytes) => self.send_datagram(destination, &bytes),
                None => return,
            }
        }
    }

    fn encode(&self, message: &DiscoveryMessage) -> Option<Vec<u8>> {
        match self.codec.encode(message) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                DiscoveryMetrics::bump(&self.shared.metrics.codec_errors);
                log::debug!("[discovery] Cannot encode {}: {}", message.kind_name(), e);
                None
            }
        }
    }

    fn send_datagram(&self, destination: Locator, bytes: &[u8]) {
        match self.transport.send(destination, bytes) {
            Ok(()) => DiscoveryMetrics::bump(&self.shared.metrics.datagrams_sent),
            Err(e) => {
                DiscoveryMetrics::bump(&self.shared.metrics.transport_errors);
                log::debug!("[discovery] Send to {} failed: {}", destination, e);
            }
        }
    }
}

impl std::fmt::Debug for DiscoveryDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryDomain")
            .field("guid", &self.shared.local)
            .field("domain_id", &self.shared.config.domain_id)
            .field("secure", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DiscoveryDomain`].
pub struct DiscoveryDomainBuilder {
    participant: GUID,
    config: DiscoveryConfig,
    transport: Option<Arc<dyn Transport>>,
    data_path: Option<Arc<dyn DataPath>>,
    codec: Option<Arc<dyn WireCodec>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    incarnation: Option<u64>,
}

impl DiscoveryDomainBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Default data path for associations of local endpoints that do not
    /// carry their own.
    #[must_use]
    pub fn data_path(mut self, data_path: Arc<dyn DataPath>) -> Self {
        self.data_path = Some(data_path);
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Authenticator used when `security.enabled` is set. Without one, the
    /// HMAC authenticator is built from `security.domain_key`.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Incarnation announced with the participant (defaults to the wall
    /// clock). Peers treat a new incarnation as a restart.
    #[must_use]
    pub fn incarnation(mut self, incarnation: u64) -> Self {
        self.incarnation = Some(incarnation);
        self
    }

    pub fn build(self) -> Result<Arc<DiscoveryDomain>> {
        self.config.validate()?;
        if !self.participant.is_participant() {
            return Err(Error::InvalidConfig(format!(
                "{} is not a participant GUID",
                self.participant
            )));
        }
        let transport = self.transport.ok_or(Error::MissingCollaborator("transport"))?;
        let data_path = self.data_path.ok_or(Error::MissingCollaborator("data_path"))?;
        let codec = self.codec.ok_or(Error::MissingCollaborator("codec"))?;

        let authenticator = if self.config.security.enabled {
            Some(resolve_authenticator(
                self.participant,
                &self.config,
                self.authenticator,
            )?)
        } else {
            None
        };
        let incarnation = self.incarnation.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or_default()
        });

        let shared = Shared {
            local: self.participant,
            config: self.config,
            data_path,
            outbound: OutboundQueue::new(),
            metrics: Arc::new(DiscoveryMetrics::new()),
            diagnostics: QosDiagnostics::new(),
        };
        let gate = authenticator.as_ref().map(|authenticator| {
            SecurityGate::new(shared.local, authenticator.as_ref(), &shared.config.security)
        });
        let state = DomainState::new(&shared, gate, incarnation);
        let view = state.directory.shared();
        let status = StatusChannel::new(shared.config.status_queue_depth);

        log::info!(
            "[discovery] Domain {} ready for {} (security: {})",
            shared.config.domain_id,
            shared.local,
            authenticator.is_some()
        );
        Ok(Arc::new(DiscoveryDomain {
            shared,
            state: ReentrantMutex::new(RefCell::new(state)),
            drain_lock: Mutex::new(()),
            status,
            transport,
            codec,
            authenticator,
            view,
            fragment_sequence: AtomicU64::new(0),
        }))
    }
}

#[cfg(feature = "security")]
fn resolve_authenticator(
    participant: GUID,
    config: &DiscoveryConfig,
    given: Option<Arc<dyn Authenticator>>,
) -> Result<Arc<dyn Authenticator>> {
    if let Some(authenticator) = given {
        return Ok(authenticator);
    }
    match config.security.domain_key.as_deref() {
        Some(key) => Ok(Arc::new(crate::security::HmacAuthenticator::from_base64_key(
            participant,
            key,
        )?)),
        None => Err(Error::MissingCollaborator("authenticator")),
    }
}

#[cfg(not(feature = "security"))]
fn resolve_authenticator(
    _participant: GUID,
    _config: &DiscoveryConfig,
    given: Option<Arc<dyn Authenticator>>,
) -> Result<Arc<dyn Authenticator>> {
    given.ok_or(Error::MissingCollaborator("authenticator"))
}

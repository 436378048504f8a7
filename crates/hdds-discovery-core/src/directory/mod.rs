// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovered entity directory.
//!
//! Authoritative record of remote participants, remote endpoints and local
//! endpoints, with secondary indices by topic and by owning participant.
//!
//! # Snapshots
//!
//! The directory is mutated only under the domain lock, on a working copy.
//! [`Directory::publish`] installs an immutable [`DirectoryView`] through
//! `arc-swap`; readers load it without any lock and always see a fully
//! applied state, never a half-constructed record.
//!
//! # Removal
//!
//! Removing a participant or a local endpoint is two-phase. The first phase
//! marks the record and detaches what depends on it so the caller can tear
//! down associations; the second phase (`purge_*`) drops the record once
//! every `remove_association` has been delivered.
//!
//! # Ignoring
//!
//! A remote participant, endpoint or topic can be ignored. Announcements
//! about ignored entities are dropped from then on; the ignore lists live
//! only in the directory owner and are not part of the published view.

mod change;
mod records;

pub use change::{EndpointChange, ParticipantChange};
pub use records::{DiscoveredEndpoint, LocalEndpoint, ParticipantRecord};

use crate::guid::GUID;
use crate::messages::{EndpointData, ParticipantData};
use crate::qos::QoS;
use arc_swap::ArcSwap;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Unknown participant {0}")]
    UnknownParticipant(GUID),

    #[error("Endpoint {endpoint} does not belong to participant {participant}")]
    ParticipantMismatch { endpoint: GUID, participant: GUID },

    #[error("Endpoint {0} announced with a kind that contradicts its GUID or previous record")]
    KindMismatch(GUID),

    #[error("Unknown local endpoint {0}")]
    UnknownLocalEndpoint(GUID),

    #[error("Local endpoint {0} already exists")]
    DuplicateLocalEndpoint(GUID),

    #[error("Endpoint {0} does not belong to the local participant")]
    NotLocal(GUID),

    #[error("Cannot ignore local entity {0}")]
    IgnoreLocal(GUID),
}

/// Liveliness of a participant as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantLiveliness {
    Alive,
    /// Lease expired, disposed, or removal in progress
    Expired,
    Unknown,
}

/// Immutable directory snapshot.
///
/// Each table is shared between snapshots and copied on first write, so
/// publishing after a change only copies the tables that change touched.
#[derive(Debug, Clone, Default)]
pub struct DirectoryView {
    participants: Arc<HashMap<GUID, Arc<ParticipantRecord>>>,
    endpoints: Arc<HashMap<GUID, Arc<DiscoveredEndpoint>>>,
    by_topic: Arc<HashMap<String, Vec<GUID>>>,
    by_participant: Arc<HashMap<GUID, Vec<GUID>>>,
    locals: Arc<HashMap<GUID, Arc<LocalEndpoint>>>,
    local_by_topic: Arc<HashMap<String, Vec<GUID>>>,
}

impl DirectoryView {
    pub fn participant(&self, guid: &GUID) -> Option<&Arc<ParticipantRecord>> {
        self.participants.get(guid)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Arc<ParticipantRecord>> {
        self.participants.values()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn endpoint(&self, guid: &GUID) -> Option<&Arc<DiscoveredEndpoint>> {
        self.endpoints.get(guid)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Remote endpoints on `topic_name`, via the topic index.
    pub fn find_by_topic<'a>(
        &'a self,
        topic_name: &str,
    ) -> impl Iterator<Item = &'a Arc<DiscoveredEndpoint>> + 'a {
        self.by_topic
            .get(topic_name)
            .into_iter()
            .flatten()
            .filter_map(|guid| self.endpoints.get(guid))
    }

    /// Remote endpoints owned by `participant`.
    pub fn endpoints_of<'a>(
        &'a self,
        participant: &GUID,
    ) -> impl Iterator<Item = &'a Arc<DiscoveredEndpoint>> + 'a {
        self.by_participant
            .get(participant)
            .into_iter()
            .flatten()
            .filter_map(|guid| self.endpoints.get(guid))
    }

    pub fn local(&self, guid: &GUID) -> Option<&Arc<LocalEndpoint>> {
        self.locals.get(guid)
    }

    pub fn locals(&self) -> impl Iterator<Item = &Arc<LocalEndpoint>> {
        self.locals.values()
    }

    pub fn locals_on_topic<'a>(
        &'a self,
        topic_name: &str,
    ) -> impl Iterator<Item = &'a Arc<LocalEndpoint>> + 'a {
        self.local_by_topic
            .get(topic_name)
            .into_iter()
            .flatten()
            .filter_map(|guid| self.locals.get(guid))
    }

    fn index_endpoint(&mut self, endpoint: &DiscoveredEndpoint) {
        Arc::make_mut(&mut self.by_topic)
            .entry(endpoint.topic_name.clone())
            .or_default()
            .push(endpoint.guid);
        Arc::make_mut(&mut self.by_participant)
            .entry(endpoint.participant)
            .or_default()
            .push(endpoint.guid);
    }

    /// Drop every remote endpoint owned by `participant`.
    fn remove_endpoints_of(&mut self, participant: &GUID) -> Vec<Arc<DiscoveredEndpoint>> {
        let Some(owned) = Arc::make_mut(&mut self.by_participant).remove(participant) else {
            return Vec::new();
        };
        let endpoints = Arc::make_mut(&mut self.endpoints);
        let by_topic = Arc::make_mut(&mut self.by_topic);
        let mut removed = Vec::with_capacity(owned.len());
        for guid in owned {
            if let Some(endpoint) = endpoints.remove(&guid) {
                remove_from_index(by_topic, &endpoint.topic_name, &endpoint.guid);
                removed.push(endpoint);
            }
        }
        removed
    }

    fn unindex_endpoint(&mut self, endpoint: &DiscoveredEndpoint) {
        remove_from_index(Arc::make_mut(&mut self.by_topic), &endpoint.topic_name, &endpoint.guid);
        remove_from_index(Arc::make_mut(&mut self.by_participant), &endpoint.participant, &endpoint.guid);
    }
}

fn remove_from_index<K>(index: &mut HashMap<K, Vec<GUID>>, key: &K, guid: &GUID)
where
    K: std::hash::Hash + Eq,
{
    if let Some(list) = index.get_mut(key) {
        list.retain(|g| g != guid);
        if list.is_empty() {
            index.remove(key);
        }
    }
}

/// Directory owner. Lives in the domain state.
pub struct Directory {
    local_participant: GUID,
    max_participants: usize,
    working: DirectoryView,
    published: Arc<ArcSwap<DirectoryView>>,
    dirty: bool,
    /// Recently removed participants (for `participant_liveliness`)
    expired: LruCache<GUID, Instant>,
    ignored: HashSet<GUID>,
    ignored_topics: HashSet<String>,
}

impl Directory {
    pub fn new(local_participant: GUID, max_participants: usize, expired_history: usize) -> Self {
        Self {
            local_participant,
            max_participants: max_participants.max(1),
            working: DirectoryView::default(),
            published: Arc::new(ArcSwap::from_pointee(DirectoryView::default())),
            dirty: false,
            expired: LruCache::new(NonZeroUsize::new(expired_history).unwrap_or(NonZeroUsize::MIN)),
            ignored: HashSet::new(),
            ignored_topics: HashSet::new(),
        }
    }

    /// Working state (caller holds the domain lock).
    pub fn view(&self) -> &DirectoryView {
        &self.working
    }

    /// Handle readers use to load published snapshots.
    pub fn shared(&self) -> Arc<ArcSwap<DirectoryView>> {
        Arc::clone(&self.published)
    }

    /// Publish the working state if it changed since the last publish.
    pub fn publish(&mut self) {
        if self.dirty {
            self.published.store(Arc::new(self.working.clone()));
            self.dirty = false;
        }
    }

    /// Drop future announcements about remote participant or endpoint
    /// `guid`. Returns `false` when it was already ignored.
    pub fn ignore(&mut self, guid: GUID) -> Result<bool, DirectoryError> {
        if guid.prefix == self.local_participant.prefix {
            return Err(DirectoryError::IgnoreLocal(guid));
        }
        Ok(self.ignored.insert(guid))
    }

    /// Drop future announcements of remote endpoints on `topic_name`.
    pub fn ignore_topic(&mut self, topic_name: &str) -> bool {
        self.ignored_topics.insert(topic_name.to_string())
    }

    /// `guid` or its participant is ignored.
    pub fn is_ignored(&self, guid: &GUID) -> bool {
        self.ignored.contains(guid) || self.ignored.contains(&guid.participant_guid())
    }

    pub fn is_topic_ignored(&self, topic_name: &str) -> bool {
        self.ignored_topics.contains(topic_name)
    }

    pub fn liveliness(&self, guid: &GUID) -> ParticipantLiveliness {
        match self.working.participants.get(guid) {
            Some(record) if record.removing => ParticipantLiveliness::Expired,
            Some(_) => ParticipantLiveliness::Alive,
            None if self.expired.contains(guid) => ParticipantLiveliness::Expired,
            None => ParticipantLiveliness::Unknown,
        }
    }

    /// Apply a participant announcement.
    pub fn upsert_participant(&mut self, data: &ParticipantData, now: Instant) -> ParticipantChange {
        crate::trace_fn!("Directory::upsert_participant");
        if data.guid == self.local_participant || self.ignored.contains(&data.guid) {
            return ParticipantChange::Ignored;
        }

        let Some(existing) = self.working.participants.get(&data.guid) else {
            let evicted = self.capacity_victim();
            if let Some(victim) = evicted {
                log::warn!(
                    "[directory] Participant capacity {} reached, evicting least recently refreshed {}",
                    self.max_participants,
                    victim
                );
            }
            self.expired.pop(&data.guid);
            let record = ParticipantRecord::from_data(data, now);
            log::info!("[directory] Participant discovered: {}", data.guid);
            Arc::make_mut(&mut self.working.participants).insert(data.guid, Arc::new(record));
            self.dirty = true;
            return ParticipantChange::Added { evicted };
        };

        if existing.removing {
            return ParticipantChange::Ignored;
        }
        if existing.incarnation != data.incarnation {
            log::info!(
                "[directory] Participant {} restarted (incarnation {} -> {})",
                data.guid,
                existing.incarnation,
                data.incarnation
            );
            return ParticipantChange::Restarted;
        }
        if data.sequence < existing.sequence {
            log::debug!(
                "[directory] Stale announcement from {} (seq {} < {})",
                data.guid,
                data.sequence,
                existing.sequence
            );
            return ParticipantChange::Stale;
        }

        let previous = Arc::clone(existing);
        let change = if data.sequence == previous.sequence {
            let mut record = (*previous).clone();
            record.last_seen = now;
            Arc::make_mut(&mut self.working.participants).insert(data.guid, Arc::new(record));
            ParticipantChange::Refreshed
        } else {
            let content_changed = previous.content_differs(data);
            let mut record = ParticipantRecord::from_data(data, now);
            record.first_seen = previous.first_seen;
            Arc::make_mut(&mut self.working.participants).insert(data.guid, Arc::new(record));
            ParticipantChange::Updated {
                previous,
                content_changed,
            }
        };
        self.dirty = true;
        change
    }

    /// Least-recently-refreshed live participant, when at capacity.
    fn capacity_victim(&self) -> Option<GUID> {
        let live = self.working.participants.values().filter(|p| !p.removing);
        if live.clone().count() < self.max_participants {
            return None;
        }
        live.min_by_key(|p| (p.last_seen, p.guid)).map(|p| p.guid)
    }

    /// Phase one of participant removal: mark it and detach its endpoints.
    ///
    /// Returns the detached endpoints, or `None` if the participant is
    /// unknown or already being removed.
    pub fn begin_participant_removal(&mut self, guid: &GUID) -> Option<Vec<Arc<DiscoveredEndpoint>>> {
        let existing = self.working.participants.get(guid)?;
        if existing.removing {
            return None;
        }
        let mut record = (**existing).clone();
        record.removing = true;
        Arc::make_mut(&mut self.working.participants).insert(*guid, Arc::new(record));

        let mut detached = self.working.remove_endpoints_of(guid);
        detached.sort_by_key(|e| e.guid);
        self.dirty = true;
        Some(detached)
    }

    /// Phase two: drop the record and remember it as expired.
    pub fn purge_participant(&mut self, guid: &GUID, now: Instant) -> bool {
        let Some(record) = Arc::make_mut(&mut self.working.participants).remove(guid) else {
            return false;
        };
        if !record.removing {
            log::error!("[directory] Purging participant {} without removal phase", guid);
            self.working.remove_endpoints_of(guid);
        }
        self.expired.put(*guid, now);
        self.dirty = true;
        log::info!("[directory] Participant removed: {}", guid);
        true
    }

    /// Apply an endpoint announcement.
    pub fn upsert_endpoint(
        &mut self,
        data: &EndpointData,
        now: Instant,
    ) -> Result<EndpointChange, DirectoryError> {
        crate::trace_fn!("Directory::upsert_endpoint");
        if data.guid.participant_guid() != data.participant {
            return Err(DirectoryError::ParticipantMismatch {
                endpoint: data.guid,
                participant: data.participant,
            });
        }
        if self.is_ignored(&data.guid) || self.is_topic_ignored(&data.topic_name) {
            return Ok(EndpointChange::Ignored);
        }
        match self.working.participants.get(&data.participant) {
            Some(p) if !p.removing => {}
            _ => return Err(DirectoryError::UnknownParticipant(data.participant)),
        }
        if data.guid.endpoint_kind().is_some_and(|kind| kind != data.kind) {
            return Err(DirectoryError::KindMismatch(data.guid));
        }

        let Some(existing) = self.working.endpoints.get(&data.guid) else {
            let endpoint = DiscoveredEndpoint::from_data(data, now);
            self.working.index_endpoint(&endpoint);
            Arc::make_mut(&mut self.working.endpoints).insert(data.guid, Arc::new(endpoint));
            self.dirty = true;
            log::debug!(
                "[directory] New {} {} on topic '{}'",
                data.kind,
                data.guid,
                data.topic_name
            );
            return Ok(EndpointChange::Added);
        };

        if existing.kind != data.kind {
            return Err(DirectoryError::KindMismatch(data.guid));
        }
        if data.sequence < existing.sequence {
            return Ok(EndpointChange::Stale);
        }
        if data.sequence == existing.sequence {
            return Ok(EndpointChange::Unchanged);
        }

        let previous = Arc::clone(existing);
        let changed = previous.content_differs(data);
        let endpoint = DiscoveredEndpoint::from_data(data, now);
        if previous.topic_name != endpoint.topic_name {
            self.working.unindex_endpoint(&previous);
            self.working.index_endpoint(&endpoint);
        }
        Arc::make_mut(&mut self.working.endpoints).insert(data.guid, Arc::new(endpoint));
        self.dirty = true;
        if changed {
            Ok(EndpointChange::Changed { previous })
        } else {
            Ok(EndpointChange::Unchanged)
        }
    }

    /// Remove a remote endpoint (explicit disposal).
    pub fn remove_endpoint(&mut self, guid: &GUID) -> Option<Arc<DiscoveredEndpoint>> {
        let endpoint = Arc::make_mut(&mut self.working.endpoints).remove(guid)?;
        self.working.unindex_endpoint(&endpoint);
        self.dirty = true;
        Some(endpoint)
    }

    /// Register a local endpoint.
    pub fn add_local(&mut self, endpoint: LocalEndpoint) -> Result<Arc<LocalEndpoint>, DirectoryError> {
        if endpoint.guid.prefix != self.local_participant.prefix {
            return Err(DirectoryError::NotLocal(endpoint.guid));
        }
        if endpoint
            .guid
            .endpoint_kind()
            .is_some_and(|kind| kind != endpoint.kind)
        {
            return Err(DirectoryError::KindMismatch(endpoint.guid));
        }
        if self.working.locals.contains_key(&endpoint.guid) {
            return Err(DirectoryError::DuplicateLocalEndpoint(endpoint.guid));
        }
        let endpoint = Arc::new(endpoint);
        Arc::make_mut(&mut self.working.local_by_topic)
            .entry(endpoint.topic_name.clone())
            .or_default()
            .push(endpoint.guid);
        Arc::make_mut(&mut self.working.locals).insert(endpoint.guid, Arc::clone(&endpoint));
        self.dirty = true;
        Ok(endpoint)
    }

    /// Replace the QoS of a local endpoint and bump its metadata sequence.
    ///
    /// Returns the updated record.
    pub fn update_local_qos(
        &mut self,
        guid: &GUID,
        qos: QoS,
        sequence: u64,
    ) -> Result<Arc<LocalEndpoint>, DirectoryError> {
        let existing = self.live_local(guid)?;
        let mut endpoint = (**existing).clone();
        endpoint.qos = qos;
        endpoint.sequence = sequence;
        let endpoint = Arc::new(endpoint);
        Arc::make_mut(&mut self.working.locals).insert(*guid, Arc::clone(&endpoint));
        self.dirty = true;
        Ok(endpoint)
    }

    /// Assign the metadata sequence of the next announcement.
    pub fn set_local_sequence(&mut self, guid: &GUID, sequence: u64) -> Result<Arc<LocalEndpoint>, DirectoryError> {
        let existing = self.live_local(guid)?;
        let mut endpoint = (**existing).clone();
        endpoint.sequence = sequence;
        let endpoint = Arc::new(endpoint);
        Arc::make_mut(&mut self.working.locals).insert(*guid, Arc::clone(&endpoint));
        self.dirty = true;
        Ok(endpoint)
    }

    /// Phase one of local endpoint deletion: mark it deleting.
    pub fn begin_local_deletion(&mut self, guid: &GUID) -> Result<Arc<LocalEndpoint>, DirectoryError> {
        let existing = self.live_local(guid)?;
        let mut endpoint = (**existing).clone();
        endpoint.deleting = true;
        let endpoint = Arc::new(endpoint);
        Arc::make_mut(&mut self.working.locals).insert(*guid, Arc::clone(&endpoint));
        self.dirty = true;
        Ok(endpoint)
    }

    /// Phase two: drop the local endpoint.
    pub fn purge_local(&mut self, guid: &GUID) -> bool {
        let Some(endpoint) = Arc::make_mut(&mut self.working.locals).remove(guid) else {
            return false;
        };
        remove_from_index(
            Arc::make_mut(&mut self.working.local_by_topic),
            &endpoint.topic_name,
            guid,
        );
        self.dirty = true;
        true
    }

    fn live_local(&self, guid: &GUID) -> Result<&Arc<LocalEndpoint>, DirectoryError> {
        match self.working.locals.get(guid) {
            Some(endpoint) if !endpoint.deleting => Ok(endpoint),
            _ => Err(DirectoryError::UnknownLocalEndpoint(*guid)),
        }
    }
}

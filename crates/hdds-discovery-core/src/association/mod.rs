// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Association table and lifecycle.
//!
//! ```text
//!   (none) --begin(secure)--> PendingSecurity --complete_security--> Associated
//!   (none) --begin(open)----------------------------------------->   Associated
//!   Associated --begin_teardown--> Disassociating --finish_teardown--> (none)
//!   PendingSecurity --begin_teardown--> (none)
//! ```
//!
//! "Unmatched" is the absence of a record. A record leaves the table only
//! after the data path has been told to stop (`finish_teardown`), so a
//! `remove_association` is always delivered before anything it names is
//! dropped. Table methods never call the data path; they report what the
//! caller must deliver.

use crate::guid::GUID;
use crate::security::CryptoHandle;
use crate::transport::{DataPath, Direction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// (local endpoint, remote endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssociationKey {
    pub local: GUID,
    pub remote: GUID,
}

impl AssociationKey {
    pub fn new(local: GUID, remote: GUID) -> Self {
        Self { local, remote }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationState {
    /// Compatible; waiting for the handshake with the remote participant
    PendingSecurity,
    /// Data path attached
    Associated,
    /// Data path told to detach; record dropped once delivered
    Disassociating,
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingSecurity => write!(f, "PendingSecurity"),
            Self::Associated => write!(f, "Associated"),
            Self::Disassociating => write!(f, "Disassociating"),
        }
    }
}

pub struct AssociationRecord {
    pub key: AssociationKey,
    pub direction: Direction,
    pub state: AssociationState,
    pub created_at: Instant,
    pub(crate) data_path: Arc<dyn DataPath>,
    pub(crate) crypto: Option<CryptoHandle>,
}

impl AssociationRecord {
    pub fn remote_participant(&self) -> GUID {
        self.key.remote.participant_guid()
    }

    pub fn crypto(&self) -> Option<&CryptoHandle> {
        self.crypto.as_ref()
    }
}

impl fmt::Debug for AssociationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationRecord")
            .field("key", &self.key)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("crypto", &self.crypto)
            .finish()
    }
}

/// Impossible transition requested; the pair is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid association transition for {key}: {from} -> {to}")]
pub struct AssociationError {
    pub key: AssociationKey,
    pub from: String,
    pub to: &'static str,
}

/// Initial state for a new association.
pub(crate) enum Establish {
    Open,
    Secure,
}

/// Result of [`AssociationTable::begin`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Begin {
    /// New record, already `Associated`: deliver `add_association`
    Associated,
    /// New record waiting for the handshake
    Pending,
    /// Record already exists in this state; nothing to do
    Exists(AssociationState),
}

/// What the data path must hear after [`AssociationTable::begin_teardown`].
#[derive(Debug)]
pub(crate) enum Teardown {
    /// Was associated: deliver `remove_association`, then `finish_teardown`
    Detach(Arc<dyn DataPath>),
    /// Was pending: record already dropped, data path never knew it
    Dropped,
    /// Already disassociating
    InProgress,
}

#[derive(Default)]
pub(crate) struct AssociationTable {
    records: BTreeMap<AssociationKey, AssociationRecord>,
    /// remote endpoint -> local endpoints
    by_remote: HashMap<GUID, BTreeSet<GUID>>,
}

impl AssociationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &AssociationKey) -> Option<&AssociationRecord> {
        self.records.get(key)
    }

    pub(crate) fn state(&self, key: &AssociationKey) -> Option<AssociationState> {
        self.records.get(key).map(|r| r.state)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Create the record for a compatible pair.
    pub(crate) fn begin(
        &mut self,
        key: AssociationKey,
        direction: Direction,
        data_path: Arc<dyn DataPath>,
        establish: Establish,
        crypto: Option<CryptoHandle>,
        now: Instant,
    ) -> Begin {
        if let Some(existing) = self.records.get(&key) {
            return Begin::Exists(existing.state);
        }
        let (state, outcome) = match establish {
            Establish::Open => (AssociationState::Associated, Begin::Associated),
            Establish::Secure if crypto.is_some() => (AssociationState::Associated, Begin::Associated),
            Establish::Secure => (AssociationState::PendingSecurity, Begin::Pending),
        };
        self.records.insert(
            key,
            AssociationRecord {
                key,
                direction,
                state,
                created_at: now,
                data_path,
                crypto,
            },
        );
        self.by_remote.entry(key.remote).or_default().insert(key.local);
        log::debug!("[assoc] {} -> {}", key, state);
        outcome
    }

    /// Handshake validated: `PendingSecurity -> Associated`.
    pub(crate) fn complete_security(
        &mut self,
        key: &AssociationKey,
        handle: CryptoHandle,
    ) -> Result<&AssociationRecord, AssociationError> {
        let Some(record) = self.records.get_mut(key) else {
            return Err(AssociationError {
                key: *key,
                from: "none".to_string(),
                to: "Associated",
            });
        };
        if record.state != AssociationState::PendingSecurity {
            return Err(AssociationError {
                key: *key,
                from: record.state.to_string(),
                to: "Associated",
            });
        }
        record.state = AssociationState::Associated;
        record.crypto = Some(handle);
        log::debug!("[assoc] {} -> Associated (secured)", key);
        Ok(record)
    }

    /// Start tearing a pair down.
    pub(crate) fn begin_teardown(&mut self, key: &AssociationKey) -> Option<Teardown> {
        let record = self.records.get_mut(key)?;
        match record.state {
            AssociationState::Associated => {
                record.state = AssociationState::Disassociating;
                log::debug!("[assoc] {} -> Disassociating", key);
                Some(Teardown::Detach(Arc::clone(&record.data_path)))
            }
            AssociationState::PendingSecurity => {
                self.drop_record(key);
                log::debug!("[assoc] {} pending record dropped", key);
                Some(Teardown::Dropped)
            }
            AssociationState::Disassociating => Some(Teardown::InProgress),
        }
    }

    /// `remove_association` was delivered: drop the record.
    pub(crate) fn finish_teardown(
        &mut self,
        key: &AssociationKey,
    ) -> Result<AssociationRecord, AssociationError> {
        match self.records.get(key).map(|r| r.state) {
            Some(AssociationState::Disassociating) => self.drop_record(key).ok_or(AssociationError {
                key: *key,
                from: "Disassociating".to_string(),
                to: "Removed",
            }),
            other => Err(AssociationError {
                key: *key,
                from: other.map_or_else(|| "none".to_string(), |s| s.to_string()),
                to: "Removed",
            }),
        }
    }

    /// Forcibly remove a record (invariant violation recovery).
    pub(crate) fn abandon(&mut self, key: &AssociationKey) -> Option<AssociationRecord> {
        self.drop_record(key)
    }

    fn drop_record(&mut self, key: &AssociationKey) -> Option<AssociationRecord> {
        let record = self.records.remove(key)?;
        if let Some(locals) = self.by_remote.get_mut(&key.remote) {
            locals.remove(&key.local);
            if locals.is_empty() {
                self.by_remote.remove(&key.remote);
            }
        }
        Some(record)
    }

    /// Keys with local endpoint `local`, in remote order.
    pub(crate) fn keys_for_local(&self, local: GUID) -> Vec<AssociationKey> {
        let start = AssociationKey::new(local, GUID::from_bytes([0; 16]));
        let end = AssociationKey::new(local, GUID::from_bytes([0xFF; 16]));
        self.records.range(start..=end).map(|(k, _)| *k).collect()
    }

    /// Keys with remote endpoint `remote`, in local order.
    pub(crate) fn keys_for_remote(&self, remote: GUID) -> Vec<AssociationKey> {
        self.by_remote
            .get(&remote)
            .map(|locals| {
                locals
                    .iter()
                    .map(|local| AssociationKey::new(*local, remote))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pending records waiting on a handshake with `participant`.
    pub(crate) fn pending_for_participant(&self, participant: GUID) -> Vec<AssociationKey> {
        self.records
            .values()
            .filter(|r| {
                r.state == AssociationState::PendingSecurity
                    && r.remote_participant() == participant
            })
            .map(|r| r.key)
            .collect()
    }

    /// Remote endpoints associated with `local`.
    pub(crate) fn matched_remotes(&self, local: GUID) -> Vec<GUID> {
        self.keys_for_local(local)
            .into_iter()
            .filter(|k| self.state(k) == Some(AssociationState::Associated))
            .map(|k| k.remote)
            .collect()
    }

    /// Local endpoints associated with `remote`.
    pub(crate) fn matched_locals(&self, remote: GUID) -> Vec<GUID> {
        self.keys_for_remote(remote)
            .into_iter()
            .filter(|k| self.state(k) == Some(AssociationState::Associated))
            .map(|k| k.local)
            .collect()
    }

    pub(crate) fn count_in(&self, state: AssociationState) -> usize {
        self.records.values().filter(|r| r.state == state).count()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incompatible-QoS diagnostics.
//!
//! Kept in `DashMap`s so status queries never take the domain lock. A pair
//! is counted once each time it becomes incompatible; re-evaluating an
//! already incompatible pair does not count again.

use crate::guid::GUID;
use crate::qos::QosPolicyId;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Incompatible-QoS status of one local endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncompatibleQosStatus {
    /// Total incompatible transitions seen
    pub total_count: u32,
    /// Increase since the status was last taken
    pub total_count_change: u32,
    /// First failing policy of the latest incompatibility
    pub last_policy_id: Option<QosPolicyId>,
    /// Per-policy counts
    pub policies: BTreeMap<QosPolicyId, u32>,
}

#[derive(Default)]
pub struct QosDiagnostics {
    per_local: DashMap<GUID, IncompatibleQosStatus>,
    per_pair: DashMap<(GUID, GUID), Vec<QosPolicyId>>,
}

impl QosDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incompatible evaluation. Returns `true` if the pair was not
    /// already incompatible (i.e. it was counted).
    pub fn record_incompatible(&self, local: GUID, remote: GUID, policies: &[QosPolicyId]) -> bool {
        let previous = self.per_pair.insert((local, remote), policies.to_vec());
        if previous.is_some() {
            return false;
        }
        let mut status = self.per_local.entry(local).or_default();
        status.total_count = status.total_count.saturating_add(1);
        status.total_count_change = status.total_count_change.saturating_add(1);
        status.last_policy_id = policies.first().copied();
        for policy in policies {
            *status.policies.entry(*policy).or_default() += 1;
        }
        true
    }

    /// The pair is compatible again (or no longer a candidate).
    pub fn clear_pair(&self, local: GUID, remote: GUID) {
        self.per_pair.remove(&(local, remote));
    }

    /// Failing policies of a pair currently incompatible.
    pub fn pair(&self, local: GUID, remote: GUID) -> Option<Vec<QosPolicyId>> {
        self.per_pair.get(&(local, remote)).map(|p| p.clone())
    }

    pub fn status(&self, local: GUID) -> IncompatibleQosStatus {
        self.per_local
            .get(&local)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Read the status and reset `total_count_change`.
    pub fn take_status(&self, local: GUID) -> IncompatibleQosStatus {
        match self.per_local.get_mut(&local) {
            Some(mut status) => {
                let snapshot = status.clone();
                status.total_count_change = 0;
                snapshot
            }
            None => IncompatibleQosStatus::default(),
        }
    }

    pub fn forget_local(&self, local: GUID) {
        self.per_local.remove(&local);
        self.per_pair.retain(|(l, _), _| *l != local);
    }

    pub fn forget_remote(&self, remote: GUID) {
        self.per_pair.retain(|(_, r), _| *r != remote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counted_once_per_transition() {
        let diag = QosDiagnostics::new();
        let local = GUID::new([1; 12], [0, 0, 1, 0x04]);
        let remote = GUID::new([2; 12], [0, 0, 1, 0x02]);

        assert!(diag.record_incompatible(local, remote, &[QosPolicyId::Reliability]));
        assert!(!diag.record_incompatible(local, remote, &[QosPolicyId::Reliability]));
        assert_eq!(diag.status(local).total_count, 1);

        diag.clear_pair(local, remote);
        assert!(diag.record_incompatible(
            local,
            remote,
            &[QosPolicyId::Durability, QosPolicyId::Reliability]
        ));

        let status = diag.take_status(local);
        assert_eq!(status.total_count, 2);
        assert_eq!(status.total_count_change, 2);
        assert_eq!(status.last_policy_id, Some(QosPolicyId::Durability));
        assert_eq!(status.policies[&QosPolicyId::Reliability], 2);
        assert_eq!(diag.take_status(local).total_count_change, 0);
    }

    #[test]
    fn test_forget() {
        let diag = QosDiagnostics::new();
        let local = GUID::new([1; 12], [0, 0, 1, 0x04]);
        let remote = GUID::new([2; 12], [0, 0, 1, 0x02]);
        diag.record_incompatible(local, remote, &[QosPolicyId::Deadline]);
        diag.forget_remote(remote);
        assert!(diag.pair(local, remote).is_none());
        diag.forget_local(local);
        assert_eq!(diag.status(local), IncompatibleQosStatus::default());
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant lease expiry scan.

use crate::directory::DirectoryView;
use crate::guid::GUID;
use std::time::Instant;

/// Participants whose lease ran out at `now`, skipping those already being
/// removed. Sorted for deterministic teardown order.
pub(crate) fn expired_participants(view: &DirectoryView, now: Instant) -> Vec<GUID> {
    let mut expired: Vec<GUID> = view
        .participants()
        .filter(|record| !record.removing && record.is_expired(now))
        .map(|record| record.guid)
        .collect();
    expired.sort();
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::messages::ParticipantData;
    use std::time::Duration;

    fn announce(prefix: u8, lease_ms: u64) -> ParticipantData {
        ParticipantData {
            guid: GUID::participant([prefix; 12]),
            domain_id: 0,
            incarnation: 1,
            sequence: 1,
            lease_duration: Duration::from_millis(lease_ms),
            locators: vec![],
            security_enabled: false,
            identity_token: None,
        }
    }

    #[test]
    fn test_only_silent_participants_expire() {
        let start = Instant::now();
        let mut directory = Directory::new(GUID::participant([0xAA; 12]), 16, 16);
        directory.upsert_participant(&announce(1, 100), start);
        directory.upsert_participant(&announce(2, 10_000), start);

        let view = directory.view();
        assert!(expired_participants(&view, start + Duration::from_millis(100)).is_empty());
        assert_eq!(
            expired_participants(&view, start + Duration::from_millis(101)),
            vec![GUID::participant([1; 12])]
        );
    }
}

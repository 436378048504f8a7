// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Change descriptors returned by directory mutations.
//!
//! Matching reacts to these incrementally instead of re-scanning the whole
//! directory.

use super::records::{DiscoveredEndpoint, ParticipantRecord};
use crate::guid::GUID;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantChange {
    /// First announcement. `evicted` names the participant pushed out to
    /// stay within capacity, whose removal the caller must start.
    Added { evicted: Option<GUID> },
    /// Same sequence again: lease refreshed only
    Refreshed,
    /// Newer sequence applied
    Updated {
        previous: Arc<ParticipantRecord>,
        content_changed: bool,
    },
    /// Different incarnation: the peer restarted and must be removed first
    Restarted,
    /// Older sequence, ignored
    Stale,
    /// Own GUID, ignored participant, or removal in progress
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointChange {
    Added,
    Changed { previous: Arc<DiscoveredEndpoint> },
    /// Same or newer sequence with identical content
    Unchanged,
    Stale,
    /// The endpoint, its participant or its topic is ignored
    Ignored,
}

impl EndpointChange {
    /// Matching must be re-evaluated for this endpoint.
    pub fn needs_matching(&self) -> bool {
        matches!(self, Self::Added | Self::Changed { .. })
    }
}

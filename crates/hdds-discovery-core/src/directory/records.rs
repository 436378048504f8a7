// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory record types.
//!
//! Records never point at each other: a [`DiscoveredEndpoint`] names its
//! participant by GUID and associations are keyed by GUID pairs. Records are
//! immutable once published; an update replaces the whole `Arc`.

use crate::guid::{EndpointKind, GUID};
use crate::messages::{EndpointData, ParticipantData};
use crate::qos::QoS;
use crate::security::IdentityToken;
use crate::transport::{DataPath, Locator};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub guid: GUID,
    pub domain_id: u32,
    pub incarnation: u64,
    /// Latest applied announcement sequence
    pub sequence: u64,
    pub lease_duration: Duration,
    pub locators: Vec<Locator>,
    pub security_enabled: bool,
    pub identity_token: Option<IdentityToken>,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Removal in progress; excluded from matching
    pub removing: bool,
}

impl ParticipantRecord {
    pub(crate) fn from_data(data: &ParticipantData, now: Instant) -> Self {
        Self {
            guid: data.guid,
            domain_id: data.domain_id,
            incarnation: data.incarnation,
            sequence: data.sequence,
            lease_duration: data.lease_duration,
            locators: data.locators.clone(),
            security_enabled: data.security_enabled,
            identity_token: data.identity_token.clone(),
            first_seen: now,
            last_seen: now,
            removing: false,
        }
    }

    /// No refresh within the lease duration.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.lease_duration
    }

    /// Announced content differs (ignores timestamps and sequence).
    pub(crate) fn content_differs(&self, data: &ParticipantData) -> bool {
        self.lease_duration != data.lease_duration
            || self.locators != data.locators
            || self.security_enabled != data.security_enabled
            || self.identity_token != data.identity_token
    }
}

/// A remote publication or subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    pub guid: GUID,
    pub participant: GUID,
    pub kind: EndpointKind,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QoS,
    pub locators: Vec<Locator>,
    pub sequence: u64,
    pub last_updated: Instant,
}

impl DiscoveredEndpoint {
    pub(crate) fn from_data(data: &EndpointData, now: Instant) -> Self {
        Self {
            guid: data.guid,
            participant: data.participant,
            kind: data.kind,
            topic_name: data.topic_name.clone(),
            type_name: data.type_name.clone(),
            qos: data.qos.clone(),
            locators: data.locators.clone(),
            sequence: data.sequence,
            last_updated: now,
        }
    }

    pub(crate) fn content_differs(&self, data: &EndpointData) -> bool {
        self.topic_name != data.topic_name
            || self.type_name != data.type_name
            || self.qos != data.qos
            || self.locators != data.locators
    }
}

/// A local publication or subscription.
///
/// ```
/// use hdds_discovery_core::{GUID, LocalEndpoint, QoS};
///
/// let guid = GUID::new([7; 12], [0, 0, 1, 0x02]);
/// let writer = LocalEndpoint::writer(guid, "Temperature", "sensors::Temp", QoS::reliable());
/// assert_eq!(writer.topic_name, "Temperature");
/// ```
#[derive(Clone)]
pub struct LocalEndpoint {
    pub guid: GUID,
    pub kind: EndpointKind,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QoS,
    /// User-data locators advertised for this endpoint
    pub locators: Vec<Locator>,
    /// Overrides the domain data path for this endpoint's associations
    pub(crate) data_path: Option<Arc<dyn DataPath>>,
    /// Metadata sequence of the latest announcement
    pub(crate) sequence: u64,
    pub(crate) deleting: bool,
}

impl LocalEndpoint {
    pub fn writer(
        guid: GUID,
        topic_name: impl Into<String>,
        type_name: impl Into<String>,
        qos: QoS,
    ) -> Self {
        Self::new(guid, EndpointKind::Writer, topic_name.into(), type_name.into(), qos)
    }

    pub fn reader(
        guid: GUID,
        topic_name: impl Into<String>,
        type_name: impl Into<String>,
        qos: QoS,
    ) -> Self {
        Self::new(guid, EndpointKind::Reader, topic_name.into(), type_name.into(), qos)
    }

    fn new(guid: GUID, kind: EndpointKind, topic_name: String, type_name: String, qos: QoS) -> Self {
        Self {
            guid,
            kind,
            topic_name,
            type_name,
            qos,
            locators: Vec::new(),
            data_path: None,
            sequence: 0,
            deleting: false,
        }
    }

    #[must_use]
    pub fn with_locators(mut self, locators: Vec<Locator>) -> Self {
        self.locators = locators;
        self
    }

    /// Route this endpoint's associations to `data_path` instead of the
    /// domain's default.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Arc<dyn DataPath>) -> Self {
        self.data_path = Some(data_path);
        self
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    pub(crate) fn to_data(&self, participant: GUID) -> EndpointData {
        EndpointData {
            guid: self.guid,
            participant,
            kind: self.kind,
            topic_name: self.topic_name.clone(),
            type_name: self.type_name.clone(),
            qos: self.qos.clone(),
            locators: self.locators.clone(),
            sequence: self.sequence,
        }
    }
}

impl fmt::Debug for LocalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEndpoint")
            .field("guid", &self.guid)
            .field("kind", &self.kind)
            .field("topic_name", &self.topic_name)
            .field("type_name", &self.type_name)
            .field("qos", &self.qos)
            .field("own_data_path", &self.data_path.is_some())
            .field("deleting", &self.deleting)
            .finish()
    }
}

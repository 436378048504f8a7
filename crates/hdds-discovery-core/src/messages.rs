// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoded discovery records.
//!
//! These are what the [`WireCodec`](crate::transport::WireCodec) produces and
//! consumes. The byte layout is the codec's business; the discovery core only
//! relies on the fields below.

use crate::fragment::FragmentHeader;
use crate::guid::{EndpointKind, GUID};
use crate::qos::QoS;
use crate::security::{Challenge, IdentityToken};
use crate::transport::Locator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Participant announcement (SPDP-style).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantData {
    pub guid: GUID,
    pub domain_id: u32,
    /// Changes whenever the process restarts with the same GUID
    pub incarnation: u64,
    /// Per-sender announcement sequence number
    pub sequence: u64,
    pub lease_duration: Duration,
    /// Unicast locators for discovery traffic
    pub locators: Vec<Locator>,
    pub security_enabled: bool,
    pub identity_token: Option<IdentityToken>,
}

/// Endpoint announcement (SEDP-style publication or subscription).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointData {
    pub guid: GUID,
    pub participant: GUID,
    pub kind: EndpointKind,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QoS,
    /// User-data locators
    pub locators: Vec<Locator>,
    /// Metadata sequence number assigned by the owning participant
    pub sequence: u64,
}

/// One piece of a message too large for a datagram.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMessage {
    pub writer: GUID,
    pub sequence: u64,
    pub header: FragmentHeader,
    pub payload: Vec<u8>,
}

/// Authentication handshake message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Sending participant
    pub source: GUID,
    /// Receiving participant
    pub destination: GUID,
    pub body: HandshakeBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeBody {
    /// Initiator to replier
    Request {
        challenge: Challenge,
        identity_token: IdentityToken,
    },
    /// Replier to initiator: own challenge, echo, signed credential
    Reply {
        challenge: Challenge,
        echoed: Challenge,
        identity_token: IdentityToken,
        signature: Vec<u8>,
    },
    /// Initiator to replier: echo of the replier's challenge, signed
    Final {
        echoed: Challenge,
        signature: Vec<u8>,
    },
}

impl HandshakeBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Reply { .. } => "reply",
            Self::Final { .. } => "final",
        }
    }
}

/// Every record the discovery core exchanges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryMessage {
    Participant(ParticipantData),
    ParticipantDisposed {
        guid: GUID,
        sequence: u64,
    },
    Endpoint(EndpointData),
    EndpointDisposed {
        guid: GUID,
        participant: GUID,
        sequence: u64,
    },
    /// Acknowledges one reliable metadata message
    Ack {
        source: GUID,
        destination: GUID,
        sequence: u64,
    },
    Fragment(FragmentMessage),
    Handshake(HandshakeMessage),
}

impl DiscoveryMessage {
    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Participant(_) => "participant",
            Self::ParticipantDisposed { .. } => "participant-disposed",
            Self::Endpoint(_) => "endpoint",
            Self::EndpointDisposed { .. } => "endpoint-disposed",
            Self::Ack { .. } => "ack",
            Self::Fragment(_) => "fragment",
            Self::Handshake(_) => "handshake",
        }
    }
}

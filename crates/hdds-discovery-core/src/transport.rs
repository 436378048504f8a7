// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator contracts.
//!
//! The discovery core never touches sockets, wire bytes, or user data. It
//! drives three collaborators handed to
//! [`DiscoveryDomain::builder`](crate::DiscoveryDomain::builder):
//!
//! - [`Transport`]: unreliable datagram delivery (may drop, reorder, duplicate)
//! - [`DataPath`]: attaches and detaches user-data links between endpoints
//! - [`WireCodec`]: converts between bytes and decoded [`DiscoveryMessage`]s
//!
//! All calls into collaborators are made from the outbound event queue, never
//! while the domain lock is held, so a collaborator may call back into the
//! domain.

use crate::guid::GUID;
use crate::messages::DiscoveryMessage;
use crate::security::CryptoHandle;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Network address of a transport endpoint.
pub type Locator = SocketAddr;

/// Callback invoked by the transport for every received datagram.
pub type ReceiveCallback = Arc<dyn Fn(Locator, &[u8]) + Send + Sync>;

/// Transport-level failure (logged and counted, never propagated to callers).
#[derive(Debug, Error)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// Encoding or decoding failure.
#[derive(Debug, Error)]
#[error("Codec error: {0}")]
pub struct CodecError(pub String);

/// Datagram transport.
pub trait Transport: Send + Sync {
    /// Send one datagram. Delivery is not guaranteed.
    fn send(&self, destination: Locator, bytes: &[u8]) -> Result<(), TransportError>;

    /// Install the callback receiving inbound datagrams.
    fn register_receive_callback(&self, callback: ReceiveCallback);

    fn join_multicast_group(&self, group: Locator) -> Result<(), TransportError>;
}

/// Direction of a data-path link, seen from the local endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local writer delivering to a remote reader
    Outbound,
    /// Local reader receiving from a remote writer
    Inbound,
}

/// User-data path.
///
/// Both calls are fire-and-forget: a collaborator logs its own failures.
/// For any pair, `add_association` and `remove_association` strictly
/// alternate, starting with `add_association`.
pub trait DataPath: Send + Sync {
    fn add_association(
        &self,
        local: GUID,
        remote: GUID,
        direction: Direction,
        crypto: Option<CryptoHandle>,
    );

    fn remove_association(&self, local: GUID, remote: GUID);
}

impl fmt::Debug for dyn DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataPath")
    }
}

/// Discovery message codec.
pub trait WireCodec: Send + Sync {
    fn encode(&self, message: &DiscoveryMessage) -> Result<Vec<u8>, CodecError>;

    /// Decode every message carried by one datagram.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<DiscoveryMessage>, CodecError>;
}

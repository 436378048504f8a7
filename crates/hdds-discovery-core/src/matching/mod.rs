// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint matching: topic, type and QoS compatibility.
//!
//! Endpoints are plain data. The capability traits below say what a piece
//! of data can do in a match: [`HasQoS`] exposes the identity and QoS,
//! [`Transmits`] marks the offering (writer) side and [`Receives`] the
//! requesting (reader) side. [`AsWriter`] / [`AsReader`] assign those roles
//! to records whose kind is only known at runtime.

mod compat;
mod diagnostics;
mod role;

pub use compat::{check, Compatibility};
pub use diagnostics::{IncompatibleQosStatus, QosDiagnostics};
pub use role::handshake_role;

use crate::directory::{DiscoveredEndpoint, LocalEndpoint};
use crate::guid::{EndpointKind, GUID};
use crate::qos::QoS;

/// Identity and QoS of an endpoint.
pub trait HasQoS {
    fn guid(&self) -> GUID;
    fn kind(&self) -> EndpointKind;
    fn topic_name(&self) -> &str;
    fn type_name(&self) -> &str;
    fn qos(&self) -> &QoS;
}

/// Offering side of a match.
pub trait Transmits: HasQoS {}

/// Requesting side of a match.
pub trait Receives: HasQoS {}

impl HasQoS for LocalEndpoint {
    fn guid(&self) -> GUID {
        self.guid
    }
    fn kind(&self) -> EndpointKind {
        self.kind
    }
    fn topic_name(&self) -> &str {
        &self.topic_name
    }
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn qos(&self) -> &QoS {
        &self.qos
    }
}

impl HasQoS for DiscoveredEndpoint {
    fn guid(&self) -> GUID {
        self.guid
    }
    fn kind(&self) -> EndpointKind {
        self.kind
    }
    fn topic_name(&self) -> &str {
        &self.topic_name
    }
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn qos(&self) -> &QoS {
        &self.qos
    }
}

/// Writer view of an endpoint.
pub struct AsWriter<'a, E: HasQoS + ?Sized>(pub &'a E);

/// Reader view of an endpoint.
pub struct AsReader<'a, E: HasQoS + ?Sized>(pub &'a E);

macro_rules! forward_has_qos {
    ($view:ident) => {
        impl<E: HasQoS + ?Sized> HasQoS for $view<'_, E> {
            fn guid(&self) -> GUID {
                self.0.guid()
            }
            fn kind(&self) -> EndpointKind {
                self.0.kind()
            }
            fn topic_name(&self) -> &str {
                self.0.topic_name()
            }
            fn type_name(&self) -> &str {
                self.0.type_name()
            }
            fn qos(&self) -> &QoS {
                self.0.qos()
            }
        }
    };
}

forward_has_qos!(AsWriter);
forward_has_qos!(AsReader);

impl<E: HasQoS + ?Sized> Transmits for AsWriter<'_, E> {}
impl<E: HasQoS + ?Sized> Receives for AsReader<'_, E> {}

/// Evaluate a local/remote pair.
///
/// Returns `None` when the pair is not a candidate at all (same kind or
/// different topic).
pub fn evaluate<L, R>(local: &L, remote: &R) -> Option<Compatibility>
where
    L: HasQoS + ?Sized,
    R: HasQoS + ?Sized,
{
    if local.topic_name() != remote.topic_name() || local.kind() == remote.kind() {
        return None;
    }
    Some(match local.kind() {
        EndpointKind::Writer => check(&AsWriter(local), &AsReader(remote)),
        EndpointKind::Reader => check(&AsWriter(remote), &AsReader(local)),
    })
}

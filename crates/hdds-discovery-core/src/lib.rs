// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hdds-discovery-core
//!
//! Discovery and association core of the HDDS middleware: learns which
//! remote participants and endpoints exist, decides which local/remote
//! endpoint pairs may exchange data, and keeps that decision consistent as
//! peers appear, change QoS, go silent or leave.
//!
//! The core never touches sockets or user data. It drives three
//! collaborators (see [`transport`]) and is driven by three kinds of input:
//! inbound datagrams, local endpoint changes and scheduler ticks.
//!
//! ## Architecture
//!
//! ```text
//!   Transport ──datagram──▶ DiscoveryDomain ◀──tick── TickTimer
//!                               │
//!        ┌──────────────┬───────┴────────┬─────────────────┐
//!        ▼              ▼                ▼                 ▼
//!   Fragment       Directory        Matching &        Security gate
//!   reassembler   (participants,    association      (per-participant
//!                  endpoints)       lifecycle         handshake)
//!                               │
//!                    outbound event queue (drained outside the lock)
//!                               │
//!        Transport::send · DataPath::add/remove_association · status channel
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdds_discovery_core::{
//!     DiscoveryConfig, DiscoveryDomain, DiscoveryRuntime, JsonCodec, LocalEndpoint, QoS, GUID,
//! };
//! # use hdds_discovery_core::transport::{DataPath, Transport};
//! # fn collaborators() -> (Arc<dyn Transport>, Arc<dyn DataPath>) { unimplemented!() }
//!
//! fn main() -> hdds_discovery_core::Result<()> {
//!     let (transport, data_path) = collaborators();
//!     let prefix = [1; 12];
//!     let domain = DiscoveryDomain::builder(GUID::participant(prefix), DiscoveryConfig::default())
//!         .transport(transport)
//!         .data_path(data_path)
//!         .codec(Arc::new(JsonCodec::new()))
//!         .build()?;
//!     let runtime = DiscoveryRuntime::start(Arc::clone(&domain))?;
//!
//!     let writer = GUID::new(prefix, [0, 0, 1, 0x02]);
//!     domain.on_local_endpoint_created(LocalEndpoint::writer(
//!         writer,
//!         "Temperature",
//!         "sensors::Temp",
//!         QoS::reliable(),
//!     ))?;
//!
//!     for event in domain.status_events().iter() {
//!         println!("{:?}", event);
//!     }
//!     runtime.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `security` (default): HMAC-SHA256 authenticator built on `ring`
//! - `yaml-config` (default): [`DiscoveryConfig::from_yaml_file`]
//! - `json-codec` (default): [`JsonCodec`] reference codec
//! - `trace`: function-entry tracing through `log::trace!`

pub mod association;
#[cfg(feature = "json-codec")]
pub mod codec;
pub mod config;
pub mod directory;
mod domain;
pub mod error;
pub mod events;
pub mod fragment;
pub mod guid;
mod logging;
pub mod matching;
pub mod messages;
pub mod metrics;
pub mod qos;
mod runtime;
pub mod scheduler;
pub mod security;
pub mod transport;

#[doc(hidden)]
pub use log as __log;

pub use association::{AssociationKey, AssociationState};
#[cfg(feature = "json-codec")]
pub use codec::JsonCodec;
pub use config::{
    DirectoryConfig, DiscoveryConfig, DiscoveryConfigBuilder, FragmentConfig, RetryConfig,
    SecurityConfig,
};
pub use directory::{
    DirectoryError, DirectoryView, DiscoveredEndpoint, LocalEndpoint, ParticipantLiveliness,
    ParticipantRecord,
};
pub use domain::{DiscoveryDomain, DiscoveryDomainBuilder};
pub use error::{Error, Result};
pub use events::{LossReason, StatusEvent};
pub use guid::{EndpointKind, GUID};
pub use matching::IncompatibleQosStatus;
pub use metrics::{DiscoveryMetrics, MetricsSnapshot};
pub use qos::QoS;
pub use runtime::DiscoveryRuntime;
#[cfg(feature = "security")]
pub use security::HmacAuthenticator;
pub use security::{Authenticator, CryptoHandle, HandshakeState, IdentityToken, SecurityError};

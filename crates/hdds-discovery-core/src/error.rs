// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-level error type.
//!
//! Network-facing entry points never return these: malformed datagrams,
//! codec failures and transport errors are logged, counted in
//! [`DiscoveryMetrics`](crate::DiscoveryMetrics) and published on the status
//! channel. `Error` is reserved for caller mistakes at construction time.

use crate::directory::DirectoryError;
use crate::security::SecurityError;
use crate::transport::{CodecError, TransportError};
use thiserror::Error;

/// Errors returned by discovery-core construction and local-endpoint APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "yaml-config")]
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

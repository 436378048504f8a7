// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security error types

use thiserror::Error;

/// Security-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// Remote credential or identity refused
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Identity token malformed or not trusted
    #[error("Invalid identity token: {0}")]
    InvalidIdentityToken(String),

    /// Signature over the handshake transcript did not verify
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Primitive failure (RNG, key derivation)
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Message out of sequence or with a wrong echo
    #[error("Handshake protocol violation: {0}")]
    ProtocolViolation(String),

    /// Deadline passed before the handshake completed
    #[error("Handshake timed out")]
    Timeout,
}

impl SecurityError {
    /// Failures that should not be retried until the remote identity changes.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::InvalidIdentityToken(_) | Self::SignatureMismatch(_)
        )
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security handshake gate.
//!
//! When enabled, associations with a secure remote participant wait in
//! `PendingSecurity` until a challenge/response handshake with that
//! participant validates. The cryptography is behind the [`Authenticator`]
//! capability; the gate only sequences messages, enforces deadlines and
//! hands the resulting [`CryptoHandle`] to the data path.
//!
//! # Protocol
//!
//! ```text
//! Initiator (greater GUID)                 Replier
//!    |                                        |
//!    |------- REQUEST(challenge_a, token) --->|
//!    |                                        | (validate token, sign)
//!    |<-- REPLY(challenge_b, echo_a, sig) ----|
//!    | (verify sig, derive secret)            |
//!    |------- FINAL(echo_b, sig) ------------>|
//!    |                                        | (verify sig, derive secret)
//! ```
//!
//! Signatures cover a transcript binding both GUIDs and both challenges, so
//! a reply or final message cannot be replayed into another handshake.

mod error;
mod gate;
mod handshake;
#[cfg(feature = "security")]
mod hmac;

pub use error::SecurityError;
pub use gate::GateStatus;
pub(crate) use gate::{GateEffect, Peer, SecurityGate};
pub use handshake::HandshakeState;
pub(crate) use handshake::{CryptoJob, CryptoOutcome};
#[cfg(feature = "security")]
pub use hmac::HmacAuthenticator;

use crate::guid::GUID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroize;

/// Opaque identity credential announced by a participant.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken(pub Vec<u8>);

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityToken({} bytes)", self.0.len())
    }
}

/// 32-byte handshake challenge (nonce).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Challenge(pub [u8; 32]);

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Challenge({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Secret shared by both peers after a validated handshake.
///
/// Zeroized on drop.
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Handle given to the data path for key derivation.
///
/// Cloning shares the same secret.
#[derive(Clone)]
pub struct CryptoHandle {
    id: u64,
    remote: GUID,
    secret: Arc<SharedSecret>,
}

impl CryptoHandle {
    pub(crate) fn new(id: u64, remote: GUID, secret: SharedSecret) -> Self {
        Self {
            id,
            remote,
            secret: Arc::new(secret),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Participant the secret is shared with.
    pub fn remote_participant(&self) -> GUID {
        self.remote
    }

    pub fn secret(&self) -> &SharedSecret {
        &self.secret
    }
}

impl fmt::Debug for CryptoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoHandle(#{} with {})", self.id, self.remote)
    }
}

impl PartialEq for CryptoHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.remote == other.remote
    }
}

/// Side of the handshake a participant plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeRole {
    Initiator,
    Replier,
}

/// Authentication capability.
///
/// Implementations must be usable without the domain lock held; every call
/// is made from the outbound event queue.
pub trait Authenticator: Send + Sync {
    /// Token announced in participant data.
    fn identity_token(&self) -> IdentityToken;

    /// Decide whether a remote identity is acceptable at all.
    fn validate_identity(&self, remote: GUID, token: &IdentityToken) -> Result<(), SecurityError>;

    fn generate_challenge(&self) -> Result<Challenge, SecurityError>;

    /// Sign a handshake transcript with the local credential.
    fn sign(&self, transcript: &[u8]) -> Result<Vec<u8>, SecurityError>;

    /// Verify a remote signature over a transcript.
    fn verify(
        &self,
        remote_token: &IdentityToken,
        transcript: &[u8],
        signature: &[u8],
    ) -> Result<(), SecurityError>;

    /// Derive the shared secret. Both sides pass the same transcript.
    fn derive_shared_secret(
        &self,
        remote_token: &IdentityToken,
        transcript: &[u8],
    ) -> Result<SharedSecret, SecurityError>;
}

/// Which message a transcript signature authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TranscriptTag {
    Reply,
    Final,
    Secret,
}

/// Bytes covered by handshake signatures and key derivation.
///
/// Layout: initiator GUID | replier GUID | challenge_a | challenge_b | tag.
pub(crate) fn transcript(
    initiator: GUID,
    replier: GUID,
    challenge_a: &Challenge,
    challenge_b: &Challenge,
    tag: TranscriptTag,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16 + 16 + 32 + 32 + 8);
    bytes.extend_from_slice(&initiator.as_bytes());
    bytes.extend_from_slice(&replier.as_bytes());
    bytes.extend_from_slice(&challenge_a.0);
    bytes.extend_from_slice(&challenge_b.0);
    bytes.extend_from_slice(match tag {
        TranscriptTag::Reply => &b"reply"[..],
        TranscriptTag::Final => &b"final"[..],
        TranscriptTag::Secret => &b"secret"[..],
    });
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_binds_roles_and_tag() {
        let a = GUID::participant([1; 12]);
        let b = GUID::participant([2; 12]);
        let ca = Challenge([3; 32]);
        let cb = Challenge([4; 32]);

        let reply = transcript(a, b, &ca, &cb, TranscriptTag::Reply);
        assert_ne!(reply, transcript(b, a, &ca, &cb, TranscriptTag::Reply));
        assert_ne!(reply, transcript(a, b, &ca, &cb, TranscriptTag::Final));
        assert_eq!(&reply[0..16], &a.as_bytes());
    }

    #[test]
    fn test_crypto_handle_hides_secret() {
        let handle = CryptoHandle::new(7, GUID::zero(), SharedSecret::new(vec![9; 32]));
        let shown = format!("{:?}", handle);
        assert!(shown.starts_with("CryptoHandle(#7"));
        assert!(!shown.contains('9'));
        assert_eq!(handle.secret().as_bytes().len(), 32);
        assert_eq!(handle.clone(), handle);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pre-shared key authenticator.
//!
//! Every participant of a secured domain holds the same domain key. The
//! identity token is the participant GUID followed by an 8-byte key id, so
//! peers configured with a different key are refused before any signature is
//! checked. Signatures are HMAC-SHA256 over the handshake transcript and the
//! shared secret is HKDF-SHA256 of the domain key with the transcript as info.

use super::{Authenticator, Challenge, IdentityToken, SecurityError, SharedSecret};
use crate::guid::GUID;
use base64::Engine;
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Minimum accepted domain key length in bytes.
pub const MIN_KEY_LEN: usize = 16;

const KEY_ID_LEN: usize = 8;
const TOKEN_LEN: usize = 16 + KEY_ID_LEN;

pub struct HmacAuthenticator {
    local: GUID,
    key: hmac::Key,
    raw_key: Zeroizing<Vec<u8>>,
    key_id: [u8; KEY_ID_LEN],
    rng: SystemRandom,
}

impl HmacAuthenticator {
    pub fn new(local: GUID, domain_key: &[u8]) -> Result<Self, SecurityError> {
        if domain_key.len() < MIN_KEY_LEN {
            return Err(SecurityError::CryptoError(format!(
                "domain key too short: {} bytes (minimum {})",
                domain_key.len(),
                MIN_KEY_LEN
            )));
        }
        let key = hmac::Key::new(hmac::HMAC_SHA256, domain_key);
        let tag = hmac::sign(&key, b"hdds-discovery-key-id");
        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(&tag.as_ref()[..KEY_ID_LEN]);

        Ok(Self {
            local,
            key,
            raw_key: Zeroizing::new(domain_key.to_vec()),
            key_id,
            rng: SystemRandom::new(),
        })
    }

    /// Build from a base64-encoded domain key (as stored in configuration).
    pub fn from_base64_key(local: GUID, encoded: &str) -> Result<Self, SecurityError> {
        let decoded = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| SecurityError::CryptoError(format!("invalid base64 key: {}", e)))?,
        );
        Self::new(local, &decoded)
    }

    pub fn key_id(&self) -> [u8; KEY_ID_LEN] {
        self.key_id
    }
}

impl Authenticator for HmacAuthenticator {
    fn identity_token(&self) -> IdentityToken {
        let mut bytes = Vec::with_capacity(TOKEN_LEN);
        bytes.extend_from_slice(&self.local.as_bytes());
        bytes.extend_from_slice(&self.key_id);
        IdentityToken(bytes)
    }

    fn validate_identity(&self, remote: GUID, token: &IdentityToken) -> Result<(), SecurityError> {
        if token.0.len() != TOKEN_LEN {
            return Err(SecurityError::InvalidIdentityToken(format!(
                "expected {} bytes, got {}",
                TOKEN_LEN,
                token.0.len()
            )));
        }
        if token.0[..16] != remote.as_bytes() {
            return Err(SecurityError::InvalidIdentityToken(format!(
                "token does not belong to {}",
                remote
            )));
        }
        if token.0[16..] != self.key_id {
            return Err(SecurityError::AuthenticationFailed(format!(
                "{} uses a different domain key",
                remote
            )));
        }
        Ok(())
    }

    fn generate_challenge(&self) -> Result<Challenge, SecurityError> {
        let mut nonce = [0u8; 32];
        self.rng.fill(&mut nonce).map_err(|_| {
            SecurityError::CryptoError(
                "SystemRandom failed to generate challenge nonce".to_string(),
            )
        })?;
        Ok(Challenge(nonce))
    }

    fn sign(&self, transcript: &[u8]) -> Result<Vec<u8>, SecurityError> {
        Ok(hmac::sign(&self.key, transcript).as_ref().to_vec())
    }

    fn verify(
        &self,
        _remote_token: &IdentityToken,
        transcript: &[u8],
        signature: &[u8],
    ) -> Result<(), SecurityError> {
        hmac::verify(&self.key, transcript, signature)
            .map_err(|_| SecurityError::SignatureMismatch("HMAC verification failed".to_string()))
    }

    fn derive_shared_secret(
        &self,
        _remote_token: &IdentityToken,
        transcript: &[u8],
    ) -> Result<SharedSecret, SecurityError> {
        let prk = Salt::new(HKDF_SHA256, &self.key_id).extract(&self.raw_key);
        let mut secret = vec![0u8; 32];
        prk.expand(&[transcript], HKDF_SHA256)
            .map_err(|_| SecurityError::CryptoError("HKDF expand failed".to_string()))?
            .fill(&mut secret)
            .map_err(|_| SecurityError::CryptoError("HKDF fill failed".to_string()))?;
        Ok(SharedSecret::new(secret))
    }
}

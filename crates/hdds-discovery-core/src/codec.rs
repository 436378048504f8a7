// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON reference codec.
//!
//! Not a wire format for interoperability: it lets two discovery cores talk
//! over a loopback transport in tests and tooling without an RTPS encoder.
//! A datagram holds a JSON array of messages.

use crate::messages::DiscoveryMessage;
use crate::transport::{CodecError, WireCodec};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl WireCodec for JsonCodec {
    fn encode(&self, message: &DiscoveryMessage) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(std::slice::from_ref(message))
            .map_err(|e| CodecError(format!("JSON encode failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<DiscoveryMessage>, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError(format!("JSON decode failed: {}", e)))
    }
}

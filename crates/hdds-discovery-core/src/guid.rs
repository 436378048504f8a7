// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS GUID (Globally Unique Identifier) and endpoint kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity id of a participant (RTPS v2.3 Table 9.2).
pub const ENTITYID_PARTICIPANT: [u8; 4] = [0x00, 0x00, 0x01, 0xC1];

/// RTPS GUID (Globally Unique Identifier)
///
/// 16-byte identifier following DDS-RTPS v2.3 spec.
///
/// # Structure
/// - Prefix: 12 bytes (participant unique)
/// - Entity ID: 4 bytes (entity within participant)
///
/// # Ordering
/// GUIDs are totally ordered by comparing the 16 bytes lexicographically,
/// prefix first, in the order they appear on the wire. Handshake role
/// assignment relies on this order (see [`crate::matching::handshake_role`]).
///
/// # Display Format
/// Hex with dots: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GUID {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

impl GUID {
    /// Create GUID from raw bytes (16 bytes total)
    ///
    /// # Examples
    /// ```
    /// use hdds_discovery_core::GUID;
    ///
    /// let bytes = [1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 193];
    /// let guid = GUID::from_bytes(bytes);
    /// assert!(guid.is_participant());
    /// ```
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; 12];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self { prefix, entity_id }
    }

    /// Create GUID from separate prefix and entity ID
    pub fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    /// Participant GUID for a prefix.
    pub fn participant(prefix: [u8; 12]) -> Self {
        Self::new(prefix, ENTITYID_PARTICIPANT)
    }

    /// Convert GUID to 16-byte array
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id);
        bytes
    }

    /// Create GUID with all zeros (invalid/placeholder)
    pub fn zero() -> Self {
        Self {
            prefix: [0; 12],
            entity_id: [0; 4],
        }
    }

    /// Check if GUID is zero (invalid)
    pub fn is_zero(&self) -> bool {
        self.prefix.iter().all(|&b| b == 0) && self.entity_id.iter().all(|&b| b == 0)
    }

    /// True when this GUID names a participant rather than an endpoint.
    pub fn is_participant(&self) -> bool {
        self.entity_id == ENTITYID_PARTICIPANT
    }

    /// GUID of the participant owning this entity.
    pub fn participant_guid(&self) -> GUID {
        Self::participant(self.prefix)
    }

    /// Endpoint kind encoded in the entity kind byte, if any.
    pub fn endpoint_kind(&self) -> Option<EndpointKind> {
        EndpointKind::from_entity_id(self.entity_id)
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        for (i, byte) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        for byte in &self.entity_id {
            write!(f, ".{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GUID({})", self)
    }
}

/// Publication or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// DataWriter (publication)
    Writer,
    /// DataReader (subscription)
    Reader,
}

impl EndpointKind {
    /// Derive the kind from the entity kind byte (RTPS v2.3 Sec.9.3.1.2).
    ///
    /// - 0x02/0x03/0xC2/0xC3: writer (with/without key, user/builtin)
    /// - 0x04/0x07/0xC4/0xC7: reader
    pub fn from_entity_id(entity_id: [u8; 4]) -> Option<Self> {
        match entity_id[3] {
            0x02 | 0x03 | 0xC2 | 0xC3 => Some(Self::Writer),
            0x04 | 0x07 | 0xC4 | 0xC7 => Some(Self::Reader),
            _ => None,
        }
    }

    /// Kind an endpoint must have to be matched with this one.
    pub fn opposite(self) -> Self {
        match self {
            Self::Writer => Self::Reader,
            Self::Reader => Self::Writer,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writer => write!(f, "writer"),
            Self::Reader => write!(f, "reader"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_from_bytes() {
        let bytes = [1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1, 193];
        let guid = GUID::from_bytes(bytes);

        assert_eq!(guid.prefix[0], 1);
        assert_eq!(guid.prefix[1], 15);
        assert_eq!(guid.entity_id[3], 193);
        assert_eq!(guid.as_bytes(), bytes);
    }

    #[test]
    fn test_guid_display() {
        let guid = GUID::new([1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1], [0, 0, 1, 193]);
        assert_eq!(
            guid.to_string(),
            "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        );
        assert!(format!("{:?}", guid).starts_with("GUID(01.0f"));
    }

    #[test]
    fn test_guid_order_is_bytewise() {
        let low = GUID::new([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF], [0xFF; 4]);
        let high = GUID::new([2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], [0; 4]);
        assert!(low < high);
        assert_eq!(low.as_bytes() < high.as_bytes(), low < high);

        let a = GUID::new([7; 12], [0, 0, 1, 0x02]);
        let b = GUID::new([7; 12], [0, 0, 1, 0x04]);
        assert!(a < b);
    }

    #[test]
    fn test_guid_zero_and_participant() {
        assert!(GUID::zero().is_zero());
        let writer = GUID::new([3; 12], [0, 0, 1, 0x03]);
        assert!(!writer.is_participant());
        assert_eq!(writer.participant_guid(), GUID::participant([3; 12]));
        assert!(writer.participant_guid().is_participant());
    }

    #[test]
    fn test_endpoint_kind_from_entity_id() {
        assert_eq!(
            EndpointKind::from_entity_id([0, 0, 1, 0x03]),
            Some(EndpointKind::Writer)
        );
        assert_eq!(
            EndpointKind::from_entity_id([0, 0, 1, 0xC7]),
            Some(EndpointKind::Reader)
        );
        assert_eq!(EndpointKind::from_entity_id(ENTITYID_PARTICIPANT), None);
        assert_eq!(EndpointKind::Writer.opposite(), EndpointKind::Reader);
    }
}

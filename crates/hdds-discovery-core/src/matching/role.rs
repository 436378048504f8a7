// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handshake role assignment.

use crate::guid::GUID;
use crate::security::HandshakeRole;

/// Role of `local` in a handshake with `remote`.
///
/// The participant with the greater GUID, compared as 16 bytes in wire
/// order, initiates. Both peers compute this independently and always
/// agree. `None` for a handshake with oneself.
pub fn handshake_role(local: GUID, remote: GUID) -> Option<HandshakeRole> {
    match local.cmp(&remote) {
        std::cmp::Ordering::Greater => Some(HandshakeRole::Initiator),
        std::cmp::Ordering::Less => Some(HandshakeRole::Replier),
        std::cmp::Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_complementary() {
        let a = GUID::participant([1; 12]);
        let b = GUID::participant([2; 12]);
        assert_eq!(handshake_role(b, a), Some(HandshakeRole::Initiator));
        assert_eq!(handshake_role(a, b), Some(HandshakeRole::Replier));
        assert_eq!(handshake_role(a, a), None);
    }

    #[test]
    fn test_first_differing_byte_decides() {
        let mut high = [0u8; 12];
        high[0] = 0x01;
        let mut low = [0xFFu8; 12];
        low[0] = 0x00;
        assert_eq!(
            handshake_role(GUID::participant(high), GUID::participant(low)),
            Some(HandshakeRole::Initiator)
        );
        // Entity id only breaks ties within one prefix
        let w = GUID::new([5; 12], [0, 0, 1, 0x02]);
        let r = GUID::new([5; 12], [0, 0, 1, 0x04]);
        assert_eq!(handshake_role(r, w), Some(HandshakeRole::Initiator));
    }

    #[test]
    fn test_roles_agree_for_random_pairs() {
        let mut seed = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        for _ in 0..1_000 {
            let mut a = [0u8; 16];
            let mut b = [0u8; 16];
            a[..8].copy_from_slice(&next().to_le_bytes());
            a[8..].copy_from_slice(&next().to_le_bytes());
            b[..8].copy_from_slice(&next().to_le_bytes());
            b[8..].copy_from_slice(&a[8..]);
            let (a, b) = (GUID::from_bytes(a), GUID::from_bytes(b));
            match (handshake_role(a, b), handshake_role(b, a)) {
                (Some(HandshakeRole::Initiator), Some(HandshakeRole::Replier))
                | (Some(HandshakeRole::Replier), Some(HandshakeRole::Initiator)) => {}
                (None, None) => assert_eq!(a, b),
                other => panic!("roles disagree for {} / {}: {:?}", a, b, other),
            }
            assert_eq!(
                handshake_role(a, b) == Some(HandshakeRole::Initiator),
                a.as_bytes() > b.as_bytes()
            );
        }
    }
}

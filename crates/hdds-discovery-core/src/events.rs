// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound event queue and status channel.
//!
//! Nothing inside the domain lock calls a collaborator. State transitions
//! push [`Outbound`] events instead; the domain drains them after releasing
//! the lock, in push order, from one thread at a time. Per-identity ordering
//! therefore follows the order in which the state machine decided things.
//!
//! [`StatusEvent`]s go to a bounded channel the application may poll. A full
//! channel drops the event and counts it; discovery never waits on a
//! status consumer.

use crate::association::AssociationKey;
use crate::guid::GUID;
use crate::messages::DiscoveryMessage;
use crate::qos::QosPolicyId;
use crate::security::{CryptoHandle, CryptoJob, SecurityError};
use crate::transport::{DataPath, Direction, Locator};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Why a participant left the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossReason {
    LeaseExpired,
    Disposed,
    Restarted,
    /// Evicted to stay within directory capacity
    Evicted,
    /// Announced without security while authentication is required
    Unauthenticated,
    /// Ignored by the application
    Ignored,
}

/// Diagnostic notification for the application.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    ParticipantDiscovered {
        guid: GUID,
    },
    ParticipantLost {
        guid: GUID,
        reason: LossReason,
    },
    AssociationEstablished {
        local: GUID,
        remote: GUID,
        secured: bool,
    },
    AssociationRemoved {
        local: GUID,
        remote: GUID,
    },
    IncompatibleQos {
        local: GUID,
        remote: GUID,
        policies: Vec<QosPolicyId>,
    },
    InconsistentType {
        local: GUID,
        remote: GUID,
    },
    HandshakeRejected {
        remote: GUID,
        error: SecurityError,
    },
    RetryAbandoned {
        destination: GUID,
        subject: GUID,
        sequence: u64,
    },
    /// Internal invariant violated; the named pair was abandoned
    InvariantViolation {
        detail: String,
    },
}

/// Work for the drain loop.
pub(crate) enum Outbound {
    /// Encode, fragment if needed, send
    Transmit {
        destination: Locator,
        message: DiscoveryMessage,
    },
    AddAssociation {
        data_path: Arc<dyn DataPath>,
        local: GUID,
        remote: GUID,
        direction: Direction,
        crypto: Option<CryptoHandle>,
    },
    RemoveAssociation {
        data_path: Arc<dyn DataPath>,
        local: GUID,
        remote: GUID,
    },
    /// Drop a `Disassociating` record (its removal was delivered)
    FinishDisassociation(AssociationKey),
    /// Phase two of participant removal
    PurgeParticipant(GUID),
    /// Phase two of local endpoint deletion
    PurgeLocal(GUID),
    /// Handshake step to run off-lock
    Crypto(CryptoJob),
    Status(StatusEvent),
}

impl Outbound {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Transmit { .. } => "transmit",
            Self::AddAssociation { .. } => "add-association",
            Self::RemoveAssociation { .. } => "remove-association",
            Self::FinishDisassociation(_) => "finish-disassociation",
            Self::PurgeParticipant(_) => "purge-participant",
            Self::PurgeLocal(_) => "purge-local",
            Self::Crypto(_) => "crypto",
            Self::Status(_) => "status",
        }
    }
}

/// Unbounded FIFO of outbound work.
pub(crate) struct OutboundQueue {
    sender: Sender<Outbound>,
    receiver: Receiver<Outbound>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn push(&self, event: Outbound) {
        // Both ends live in self, so the channel cannot be disconnected
        let _ = self.sender.send(event);
    }

    pub(crate) fn pop(&self) -> Option<Outbound> {
        self.receiver.try_recv().ok()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Bounded status channel.
pub(crate) struct StatusChannel {
    sender: Sender<StatusEvent>,
    receiver: Receiver<StatusEvent>,
}

impl StatusChannel {
    pub(crate) fn new(depth: usize) -> Self {
        let (sender, receiver) = channel::bounded(depth.max(1));
        Self { sender, receiver }
    }

    /// Publish without blocking. Returns `false` if the event was dropped.
    pub(crate) fn publish(&self, event: StatusEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::debug!("[discovery] Status channel full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Receiver handle for the application (clones share the queue).
    pub(crate) fn subscribe(&self) -> Receiver<StatusEvent> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_fifo() {
        let queue = OutboundQueue::new();
        assert!(queue.is_empty());
        queue.push(Outbound::PurgeLocal(GUID::zero()));
        queue.push(Outbound::PurgeParticipant(GUID::zero()));
        assert_eq!(queue.pop().map(|e| e.name()), Some("purge-local"));
        assert_eq!(queue.pop().map(|e| e.name()), Some("purge-participant"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_status_channel_drops_when_full() {
        let channel = StatusChannel::new(1);
        let rx = channel.subscribe();
        let event = StatusEvent::ParticipantDiscovered { guid: GUID::zero() };
        assert!(channel.publish(event.clone()));
        assert!(!channel.publish(event.clone()));
        assert_eq!(rx.try_recv().ok(), Some(event));
    }
}

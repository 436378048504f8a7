// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable endpoint-metadata outbox.
//!
//! One outbox per destination participant. Each endpoint announcement or
//! disposal carries the sender's metadata sequence number; the receiver
//! acknowledges every sequence it applied (or already had). Unacknowledged
//! messages are resent together on a Fibonacci schedule and abandoned once
//! their absolute deadline passes.

use super::FibonacciBackoff;
use crate::guid::GUID;
use crate::messages::DiscoveryMessage;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PendingMessage {
    subject: GUID,
    message: DiscoveryMessage,
    deadline: Instant,
}

/// A message dropped after its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Abandoned {
    pub(crate) destination: GUID,
    pub(crate) subject: GUID,
    pub(crate) sequence: u64,
    pub(crate) message: DiscoveryMessage,
}

#[derive(Debug)]
pub(crate) struct ReliableOutbox {
    destination: GUID,
    pending: BTreeMap<u64, PendingMessage>,
    backoff: FibonacciBackoff,
    lifetime: Duration,
    next_send: Option<Instant>,
}

impl ReliableOutbox {
    pub(crate) fn new(destination: GUID, backoff: FibonacciBackoff, lifetime: Duration) -> Self {
        Self {
            destination,
            pending: BTreeMap::new(),
            backoff,
            lifetime,
            next_send: None,
        }
    }

    /// Queue a message about endpoint `subject`. Older pending messages about
    /// the same endpoint are superseded. The caller transmits it right away;
    /// this only arms the resend.
    pub(crate) fn push(
        &mut self,
        sequence: u64,
        subject: GUID,
        message: DiscoveryMessage,
        now: Instant,
    ) {
        self.pending.retain(|_, pending| pending.subject != subject);
        self.pending.insert(
            sequence,
            PendingMessage {
                subject,
                message,
                deadline: now + self.lifetime,
            },
        );
        if self.next_send.is_none() {
            self.backoff.reset();
            self.next_send = Some(now + self.backoff.current());
        }
    }

    /// Remove an acknowledged message. Returns `false` for unknown or
    /// already-acknowledged sequences.
    pub(crate) fn acknowledge(&mut self, sequence: u64, now: Instant) -> bool {
        if self.pending.remove(&sequence).is_none() {
            return false;
        }
        self.backoff.reset();
        self.next_send = if self.pending.is_empty() {
            None
        } else {
            Some(now + self.backoff.current())
        };
        true
    }

    /// Drop messages past their deadline and return the ones due for resend.
    pub(crate) fn poll(
        &mut self,
        now: Instant,
        abandoned: &mut Vec<Abandoned>,
    ) -> Vec<DiscoveryMessage> {
        let destination = self.destination;
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| now >= pending.deadline)
            .map(|(sequence, _)| *sequence)
            .collect();
        for sequence in expired {
            if let Some(pending) = self.pending.remove(&sequence) {
                abandoned.push(Abandoned {
                    destination,
                    subject: pending.subject,
                    sequence,
                    message: pending.message,
                });
            }
        }

        if self.pending.is_empty() {
            self.next_send = None;
            return Vec::new();
        }
        match self.next_send {
            Some(at) if now >= at => {
                self.next_send = Some(now + self.backoff.advance());
                self.pending.values().map(|p| p.message.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn disposed(endpoint: u8, sequence: u64) -> (GUID, DiscoveryMessage) {
        let guid = GUID::new([1; 12], [0, 0, endpoint, 0x02]);
        let message = DiscoveryMessage::EndpointDisposed {
            guid,
            participant: guid.participant_guid(),
            sequence,
        };
        (guid, message)
    }

    fn outbox() -> ReliableOutbox {
        ReliableOutbox::new(
            GUID::participant([2; 12]),
            FibonacciBackoff::new(ms(100), ms(300)),
            ms(1_000),
        )
    }

    #[test]
    fn test_resend_until_acknowledged() {
        let start = Instant::now();
        let mut outbox = outbox();
        let (subject, message) = disposed(1, 1);
        outbox.push(1, subject, message, start);

        let mut abandoned = Vec::new();
        assert!(outbox.poll(start + ms(50), &mut abandoned).is_empty());
        assert_eq!(outbox.poll(start + ms(100), &mut abandoned).len(), 1);
        // Second interval equals the first
        assert!(outbox.poll(start + ms(150), &mut abandoned).is_empty());
        assert_eq!(outbox.poll(start + ms(200), &mut abandoned).len(), 1);

        assert!(outbox.acknowledge(1, start + ms(210)));
        assert!(!outbox.acknowledge(1, start + ms(211)));
        assert!(outbox.is_empty());
        assert!(outbox.poll(start + ms(900), &mut abandoned).is_empty());
        assert!(abandoned.is_empty());
    }

    #[test]
    fn test_newer_message_supersedes_older() {
        let start = Instant::now();
        let mut outbox = outbox();
        let (subject, first) = disposed(1, 1);
        let (_, second) = disposed(1, 2);
        let (other, third) = disposed(2, 3);
        outbox.push(1, subject, first, start);
        outbox.push(2, subject, second, start);
        outbox.push(3, other, third, start);

        // Both survivors go out on the first resend
        let mut abandoned = Vec::new();
        assert_eq!(outbox.poll(start + ms(100), &mut abandoned).len(), 2);
        assert!(!outbox.acknowledge(1, start));
        assert!(outbox.acknowledge(2, start));
        assert!(outbox.acknowledge(3, start));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_deadline_abandons() {
        let start = Instant::now();
        let mut outbox = outbox();
        let (subject, message) = disposed(1, 7);
        outbox.push(7, subject, message.clone(), start);

        let mut abandoned = Vec::new();
        assert!(outbox.poll(start + ms(1_000), &mut abandoned).is_empty());
        assert_eq!(
            abandoned,
            vec![Abandoned {
                destination: GUID::participant([2; 12]),
                subject,
                sequence: 7,
                message,
            }]
        );
        assert!(outbox.is_empty());
    }
}

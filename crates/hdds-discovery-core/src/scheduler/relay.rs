// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Presence refresh towards a discovery relay.
//!
//! The participant announcement is re-sent to the relay on a Fibonacci
//! schedule. Hearing anything from the relay resets the schedule.

use super::FibonacciBackoff;
use crate::transport::Locator;
use std::time::Instant;

/// Like the announcement, the first refresh is due on the first poll.
#[derive(Debug)]
pub(crate) struct RelayRefresh {
    locator: Locator,
    backoff: FibonacciBackoff,
    next_due: Option<Instant>,
}

impl RelayRefresh {
    pub(crate) fn new(locator: Locator, backoff: FibonacciBackoff) -> Self {
        Self {
            locator,
            backoff,
            next_due: None,
        }
    }

    pub(crate) fn locator(&self) -> Locator {
        self.locator
    }

    /// `true` when a refresh is due; advances the backoff.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        if matches!(self.next_due, Some(due) if now < due) {
            return false;
        }
        self.next_due = Some(now + self.backoff.current());
        self.backoff.advance();
        true
    }

    /// Record an inbound datagram. Returns `true` if it came from the relay.
    pub(crate) fn on_datagram(&mut self, source: Locator, now: Instant) -> bool {
        if source != self.locator {
            return false;
        }
        self.backoff.reset();
        if let Some(due) = self.next_due.as_mut() {
            *due = (*due).min(now + self.backoff.current());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_refresh_backs_off_then_resets() {
        let relay: Locator = "10.0.0.1:7400".parse().unwrap();
        let start = Instant::now();
        let mut refresh = RelayRefresh::new(relay, FibonacciBackoff::new(ms(100), ms(1_000)));

        assert!(refresh.poll(start));
        assert!(!refresh.poll(start + ms(99)));
        assert!(refresh.poll(start + ms(100)));
        // Second interval is still 100, third 200
        assert!(refresh.poll(start + ms(200)));
        assert!(!refresh.poll(start + ms(399)));
        assert!(refresh.poll(start + ms(400)));

        let other: Locator = "10.0.0.2:7400".parse().unwrap();
        assert!(!refresh.on_datagram(other, start + ms(410)));
        assert!(refresh.on_datagram(relay, start + ms(410)));
        assert!(refresh.poll(start + ms(510)));
    }
}

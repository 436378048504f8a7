// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic participant announcement.

use std::time::{Duration, Instant};

/// Unarmed until the first poll: the first announcement goes out on the
/// first tick, whatever clock the caller drives it with.
#[derive(Debug)]
pub(crate) struct AnnounceSchedule {
    period: Duration,
    next_due: Option<Instant>,
}

impl AnnounceSchedule {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    /// `true` when an announcement should go out now. The next one is
    /// scheduled one period after `now`, however late this tick is.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        if matches!(self.next_due, Some(due) if now < due) {
            return false;
        }
        self.next_due = Some(now + self.period);
        true
    }

    /// Announce on the next tick.
    pub(crate) fn trigger(&mut self, now: Instant) {
        if let Some(due) = self.next_due.as_mut() {
            *due = (*due).min(now);
        }
    }

    #[cfg(test)]
    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.next_due
    }
}

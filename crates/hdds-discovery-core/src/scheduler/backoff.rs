// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fibonacci backoff.
//!
//! Resend intervals grow `i, i, 2i, 3i, 5i, 8i, ...` up to a ceiling and then
//! hold. A reset (any fresh acknowledgment) returns to the initial interval.

use std::time::Duration;

/// Fibonacci retry interval generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    initial: Duration,
    ceiling: Duration,
    previous: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `initial`. A ceiling below `initial` is
    /// raised to `initial`.
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            initial,
            ceiling: ceiling.max(initial),
            previous: Duration::ZERO,
            current: initial,
        }
    }

    /// Interval to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Step to the next interval and return it.
    pub fn advance(&mut self) -> Duration {
        let next = self.previous.saturating_add(self.current).min(self.ceiling);
        self.previous = self.current;
        self.current = next;
        self.current
    }

    /// Back to the initial interval (fresh acknowledgment).
    pub fn reset(&mut self) {
        self.previous = Duration::ZERO;
        self.current = self.initial;
    }

    pub fn at_ceiling(&self) -> bool {
        self.current == self.ceiling
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

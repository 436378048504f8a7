// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Liveliness & retry scheduling.
//!
//! Every schedule here is evaluated from the `now` handed to it; none of
//! them sleeps or spawns. The domain calls them from
//! [`DiscoveryDomain::on_tick_at`](crate::DiscoveryDomain::on_tick_at) and
//! [`TickTimer`] drives that call in production. A late tick simply finds
//! more work due; there is never a catch-up burst.

mod announce;
mod backoff;
mod lease;
mod relay;
mod retry;
mod timer;

pub(crate) use announce::AnnounceSchedule;
pub use backoff::FibonacciBackoff;
pub(crate) use lease::expired_participants;
pub(crate) use relay::RelayRefresh;
pub(crate) use retry::ReliableOutbox;
pub use timer::TickTimer;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Function-entry tracing.
//!
//! All diagnostics go through the `log` facade; the library never installs a
//! logger. Messages carry a bracketed component tag (`[FragBuf]`,
//! `[directory]`, `[MATCH-QOS]`, `[assoc]`, `[lease]`, `[retry]`,
//! `[handshake]`, `[discovery]`) so a subscriber can filter by component.
//!
//! `trace_fn!` marks entry into hot-path functions. It expands to a
//! `log::trace!` call when the `trace` feature is enabled and to nothing
//! otherwise.
//!
//! ```ignore
//! fn handle_participant(&mut self) {
//!     trace_fn!("DiscoveryDomain::handle_participant");
//!     // ...
//! }
//! ```

/// Trace function entry (enabled by the `trace` feature).
#[macro_export]
#[cfg(feature = "trace")]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        $crate::__log::trace!("[enter] {}", $fn_name);
    };
}

/// No-op trace macro (when trace feature disabled).
#[macro_export]
#[cfg(not(feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}

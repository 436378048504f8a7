// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scheduler timer thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread calling a tick function at a fixed interval.
///
/// Call `stop()` (or drop) to signal the thread and wait for join.
pub struct TickTimer {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickTimer {
    pub fn start<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("hdds-disco-timer".to_string())
            .spawn(move || {
                while !stop_flag_clone.load(Ordering::Relaxed) {
                    thread::park_timeout(interval);
                    if stop_flag_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    tick();
                }
            })?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

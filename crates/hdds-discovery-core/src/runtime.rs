// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Threads driving a [`DiscoveryDomain`].
//!
//! The transport callback only enqueues datagrams; a small worker pool feeds
//! them to the domain and a [`TickTimer`] calls `on_tick`. The queue holds
//! `4 * fragments.max_pending` datagrams per worker; when it is full,
//! datagrams are dropped and counted like any other network loss.

use crate::domain::DiscoveryDomain;
use crate::error::Result;
use crate::metrics::DiscoveryMetrics;
use crate::scheduler::TickTimer;
use crate::transport::Locator;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WORKER_POLL: Duration = Duration::from_millis(100);

type Datagram = (Locator, Vec<u8>);

/// Worker pool and timer thread for one domain.
///
/// Stopping (explicitly or on drop) sends a participant disposal, then
/// joins every thread.
pub struct DiscoveryRuntime {
    domain: Arc<DiscoveryDomain>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    timer: Option<TickTimer>,
}

impl DiscoveryRuntime {
    pub fn start(domain: Arc<DiscoveryDomain>) -> Result<Self> {
        let config = domain.config();
        let transport = Arc::clone(domain.transport());

        if let Some(group) = config.multicast_group {
            transport.join_multicast_group(group)?;
        }

        let capacity = config.worker_threads * config.fragments.max_pending * 4;
        let (sender, receiver) = channel::bounded::<Datagram>(capacity.max(1));
        let metrics = Arc::clone(domain.metrics_handle());
        transport.register_receive_callback(Arc::new(move |source: Locator, bytes: &[u8]| {
            match sender.try_send((source, bytes.to_vec())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    DiscoveryMetrics::bump(&metrics.inbound_dropped);
                    log::debug!("[discovery] Inbound queue full, dropping datagram from {}", source);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }));

        let running = Arc::new(AtomicBool::new(true));
        let mut runtime = Self {
            domain: Arc::clone(&domain),
            running: Arc::clone(&running),
            workers: Vec::with_capacity(config.worker_threads),
            timer: None,
        };

        for index in 0..config.worker_threads {
            let worker = spawn_worker(
                index,
                Arc::downgrade(&domain),
                receiver.clone(),
                Arc::clone(&running),
            )?;
            runtime.workers.push(worker);
        }

        let weak = Arc::downgrade(&domain);
        runtime.timer = Some(TickTimer::start(config.tick_interval(), move || {
            if let Some(domain) = weak.upgrade() {
                domain.on_tick();
            }
        })?);

        // First announcement without waiting for the timer
        domain.on_tick();
        log::info!(
            "[discovery] Runtime started for {} ({} workers, tick {:?})",
            domain.guid(),
            runtime.workers.len(),
            config.tick_interval()
        );
        Ok(runtime)
    }

    pub fn domain(&self) -> &Arc<DiscoveryDomain> {
        &self.domain
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.domain.dispose();
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("[discovery] Inbound worker panicked");
            }
        }
        log::info!("[discovery] Runtime stopped for {}", self.domain.guid());
    }
}

impl Drop for DiscoveryRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    index: usize,
    domain: Weak<DiscoveryDomain>,
    receiver: Receiver<Datagram>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("hdds-disco-worker-{}", index))
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match receiver.recv_timeout(WORKER_POLL) {
                    Ok((source, bytes)) => match domain.upgrade() {
                        Some(domain) => domain.on_datagram_received(source, &bytes),
                        None => break,
                    },
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
}

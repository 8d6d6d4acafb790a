//! Background poll scheduler.
//!
//! Evaluates the poll gate on every tick and runs a cycle when it says so.
//! Failed cycles are logged and the loop keeps going.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ble::transport::{Discovery, Transport};
use crate::coordinator::AcquisitionCoordinator;

/// Default gate evaluation period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

/// Drives an [`AcquisitionCoordinator`] from a background task.
pub struct PollScheduler {
    is_running: Arc<AtomicBool>,
    host_running: Arc<AtomicBool>,
    refresh: Arc<Notify>,
    cycles: Arc<AtomicU64>,
    background_handle: RwLock<Option<JoinHandle<()>>>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    /// Create a stopped scheduler.
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            host_running: Arc::new(AtomicBool::new(true)),
            refresh: Arc::new(Notify::new()),
            cycles: Arc::new(AtomicU64::new(0)),
            background_handle: RwLock::new(None),
        }
    }

    /// Start polling `coordinator`, evaluating the gate every `tick`.
    ///
    /// Does nothing if already running.
    pub fn start<D, T>(&self, coordinator: Arc<AcquisitionCoordinator<D, T>>, tick: Duration)
    where
        D: Discovery + 'static,
        T: Transport<Handle = D::Handle>,
    {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return;
        }

        info!(
            "Starting poll scheduler for {} (tick {:?})",
            coordinator.identity(),
            tick
        );

        let is_running = self.is_running.clone();
        let host_running = self.host_running.clone();
        let refresh = self.refresh.clone();
        let cycles = self.cycles.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while is_running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {
                        let running = is_running.load(Ordering::SeqCst)
                            && host_running.load(Ordering::SeqCst);
                        if !coordinator.needs_poll(running) {
                            continue;
                        }
                    }
                    _ = refresh.notified() => {
                        debug!("Refresh requested for {}", coordinator.identity());
                    }
                }

                cycles.fetch_add(1, Ordering::SeqCst);
                match coordinator.poll().await {
                    Ok(reading) => debug!("Poll cycle finished: {}", reading),
                    Err(e) => warn!("Poll cycle for {} failed: {}", coordinator.identity(), e),
                }
            }

            debug!("Poll scheduler task ended");
        });

        *self.background_handle.write() = Some(handle);
    }

    /// Request an out-of-band poll, bypassing the interval check.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Tell the scheduler whether the host is fully running. Ticks do not
    /// poll while it is not; an explicit [`refresh`](Self::refresh) still does.
    pub fn set_host_running(&self, running: bool) {
        self.host_running.store(running, Ordering::SeqCst);
    }

    /// Shared host-state flag, for hosts that track readiness themselves.
    pub fn host_state(&self) -> Arc<AtomicBool> {
        self.host_running.clone()
    }

    /// Whether the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Number of poll cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the task to end.
    ///
    /// An in-flight cycle is cancelled; its link is still released.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping poll scheduler");

        let handle = self.background_handle.write().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.background_handle.write().take() {
            handle.abort();
        }
    }
}

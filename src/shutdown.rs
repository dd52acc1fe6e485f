//! Graceful drain for the predictor.
//!
//! `Running → Draining → Stopped`. While draining no new request is
//! admitted and in-flight ones may finish until the drain timeout; then the
//! root cancellation token fires and stragglers abort at their next await
//! point or model call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    /// Every in-flight request finished on its own.
    Complete,
    /// The timeout expired; `remaining` requests were cancelled.
    Timeout { remaining: u32 },
}

/// Tracks in-flight requests and coordinates the drain.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// False once a drain has started.
    pub fn is_accepting(&self) -> bool {
        self.state
            .try_read()
            .map(|s| *s == ShutdownState::Running)
            .unwrap_or(false)
    }

    /// Admit a request. Returns None while draining or stopped.
    pub fn track(&self) -> Option<ShutdownGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Fires when a drain times out.
    pub fn cancelled_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop admitting, wait up to `timeout` for in-flight requests, then
    /// cancel whatever is left.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write().await = ShutdownState::Draining;
        info!(in_flight = self.in_flight_count(), "draining");

        let result = self.wait_for_drain(timeout).await;
        if let ShutdownResult::Timeout { remaining } = result {
            warn!(remaining, "drain timed out, cancelling remaining requests");
            self.cancel.cancel();
        }

        *self.state.write().await = ShutdownState::Stopped;
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register before reading the count so a release in between is
            // not missed.
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.in_flight_count();
                    if remaining == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII in-flight marker.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

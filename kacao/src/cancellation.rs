//! One cooperative stop signal for the fetch loop, fed by a deadline timer,
//! an interrupt notification and the loop itself (quota reached, fatal error).
//!
//! The first source to fire decides the `TerminationReason`. Later requests
//! still cancel the token but never overwrite the recorded reason, so the
//! loop can tell a deadline from a signal after its poll returns.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::TerminationReason;

#[derive(Clone, Default)]
pub struct CancellationController {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    token: CancellationToken,
    reason: OnceLock<TerminationReason>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token every blocking call in the loop is bounded by.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.inner.reason.get().copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Request a stop. Returns true if this call decided the reason.
    pub fn stop(&self, reason: TerminationReason) -> bool {
        let decided = self.record(reason);
        self.inner.token.cancel();
        decided
    }

    /// Cancel the token without recording a reason; used on the way out to
    /// release the timer and signal watchers.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }

    fn record(&self, reason: TerminationReason) -> bool {
        self.inner.reason.set(reason).is_ok()
    }

    /// Stop with `DeadlineExceeded` once `timeout` elapses. No-op without a
    /// timeout.
    pub fn arm_deadline(&self, timeout: Option<Duration>) -> Option<JoinHandle<()>> {
        let timeout = timeout?;
        let controller = self.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = controller.inner.token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if controller.stop(TerminationReason::DeadlineExceeded) {
                        warn!(timeout_secs = timeout.as_secs(), "Deadline reached, stopping fetch loop");
                    }
                }
            }
        }))
    }

    /// Watch `signal`; when it resolves, record `SignalReceived`, run
    /// `on_signal` (which closes the shared client) and cancel the token.
    pub fn watch_signal<S, F>(&self, signal: S, on_signal: F) -> JoinHandle<()>
    where
        S: Future<Output = ()> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = controller.inner.token.cancelled() => {}
                _ = signal => {
                    if controller.record(TerminationReason::SignalReceived) {
                        info!("Interrupt received, closing client");
                        on_signal();
                    }
                    controller.inner.token.cancel();
                }
            }
        })
    }
}

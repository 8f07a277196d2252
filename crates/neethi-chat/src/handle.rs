//! A cloneable handle for poking the session from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for poking the session from external code,
/// e.g. aborting a reply from a Ctrl-C handler.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) idle_notify: Arc<tokio::sync::Notify>,
    pub(crate) busy: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark a request as started and hand out a fresh cancellation token for it
    pub(crate) fn start(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.busy.store(true, Ordering::Release);
        token
    }

    /// Mark the request as finished and wake idle waiters
    pub(crate) fn finish(&self) {
        self.busy.store(false, Ordering::Release);
        self.idle_notify.notify_waiters();
    }

    /// The token of the current (or most recent) request
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Abort the in-flight request, if any. Streamed content is kept.
    pub fn abort(&self) {
        if self.is_busy() {
            tracing::debug!("aborting in-flight request");
        }
        self.cancel.lock().cancel();
    }

    /// Whether a request is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait until no request is in flight.
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_busy() {
            return;
        }
        notified.await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_busy() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_idle_when_never_started() {
        let handle = SessionHandle::new();
        assert!(!handle.is_busy());
        assert!(handle.wait_for_idle_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_finish_wakes_waiters() {
        let handle = SessionHandle::new();
        handle.start();
        assert!(handle.is_busy());
        assert!(!handle.wait_for_idle_timeout(Duration::from_millis(10)).await);

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait_for_idle().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.finish();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_abort_cancels_current_token_only() {
        let handle = SessionHandle::new();
        let first = handle.start();
        handle.abort();
        assert!(first.is_cancelled());

        let second = handle.start();
        assert!(!second.is_cancelled());
        assert!(!handle.token().is_cancelled());
    }
}

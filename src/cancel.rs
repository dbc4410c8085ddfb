//! Cooperative stop signal shared between the caller and a running job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cloneable stop flag. The caller sets it, the job polls it at safe points.
///
/// The flag is the source of truth; the `Notify` only wakes sleeps that
/// want to end early (rate-limit backoff) and never interrupts a request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stop: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.stop.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Resolves once a stop has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

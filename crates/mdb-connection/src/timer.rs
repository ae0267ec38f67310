//! Single-shot cancellable deadline.
//!
//! The watchdog only needs "run this once after a delay unless cancelled".
//! [`DeadlineTimer`] captures exactly that so the state machine does not
//! depend on a particular runtime's timer API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Expiry action handed to [`DeadlineTimer::arm`].
pub type ExpiryFn = Box<dyn FnOnce() + Send + 'static>;

/// A timer holding at most one pending deadline.
pub trait DeadlineTimer: Send {
    /// Start a deadline; any previously pending deadline is cancelled first.
    fn arm(&mut self, after: Duration, on_expiry: ExpiryFn);

    /// Cancel the pending deadline, if any.
    fn cancel(&mut self);

    /// Whether a deadline is pending (armed and neither fired nor cancelled).
    fn is_pending(&self) -> bool;
}

struct Pending {
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

/// [`DeadlineTimer`] backed by a spawned `tokio::time::sleep`.
///
/// Must be armed from within a tokio runtime.
#[derive(Default)]
pub struct TokioTimer {
    pending: Option<Pending>,
}

impl TokioTimer {
    /// Create an unarmed timer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeadlineTimer for TokioTimer {
    fn arm(&mut self, after: Duration, on_expiry: ExpiryFn) {
        self.cancel();

        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();
        let task_fired = Arc::clone(&fired);

        drop(tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    task_fired.store(true, Ordering::Release);
                    on_expiry();
                }
            }
        }));

        self.pending = Some(Pending { cancel, fired });
    }

    fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }

    fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| !p.fired.load(Ordering::Acquire) && !p.cancel.is_cancelled())
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

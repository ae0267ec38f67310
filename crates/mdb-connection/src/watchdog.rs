//! Liveness watchdog.
//!
//! The server sends traffic at least once per second. When nothing arrives
//! within the watchdog interval the connection is assumed dead even if the
//! socket never reported an error (half-open TCP, suspended laptop).
//!
//! ```text
//!            enable            expiry
//! Disabled ─────────▶ Armed ─────────▶ Expired
//!     ▲                │  ▲               │
//!     │     disable    │  └── reset ──────┘
//!     └────────────────┘
//! ```
//!
//! Each arm gets a new generation number. The expiry callback reports the
//! generation it was armed with, and [`Watchdog::expire`] ignores any
//! generation that is no longer current, so a deadline that fires while a
//! reset is racing it can never be mistaken for a live one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::timer::DeadlineTimer;

/// Default watchdog interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Watchdog lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchdogState {
    /// No deadline pending and none will be started by traffic.
    Disabled,
    /// A deadline is pending.
    Armed,
    /// The deadline fired; waiting for the owner to reset or disable.
    Expired,
}

/// Called with the generation of the deadline that fired.
pub type ExpiryNotify = Arc<dyn Fn(u64) + Send + Sync>;

/// Single-deadline liveness timer.
pub struct Watchdog {
    timer: Box<dyn DeadlineTimer>,
    interval: Duration,
    state: WatchdogState,
    generation: u64,
    notify: ExpiryNotify,
    state_tx: watch::Sender<WatchdogState>,
}

impl Watchdog {
    /// Create a disabled watchdog.
    ///
    /// `notify` runs on the timer's context when a deadline fires; it should
    /// only forward the generation to whoever owns the watchdog.
    pub fn new(timer: Box<dyn DeadlineTimer>, interval: Duration, notify: ExpiryNotify) -> Self {
        let (state_tx, _) = watch::channel(WatchdogState::Disabled);
        Self {
            timer,
            interval,
            state: WatchdogState::Disabled,
            generation: 0,
            notify,
            state_tx,
        }
    }

    /// Current state.
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Current interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Generation of the most recent arm.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<WatchdogState> {
        self.state_tx.subscribe()
    }

    /// Change the interval used from the next arm on.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Start (or restart) the deadline, optionally changing the interval.
    pub fn enable(&mut self, interval: Option<Duration>) {
        if let Some(interval) = interval {
            self.interval = interval;
        }
        self.arm();
    }

    /// Cancel any pending deadline.
    pub fn disable(&mut self) {
        self.timer.cancel();
        if self.state != WatchdogState::Disabled {
            debug!("watchdog disabled");
        }
        self.set_state(WatchdogState::Disabled);
    }

    /// Restart the deadline after traffic. Returns `false` when disabled.
    pub fn reset(&mut self) -> bool {
        if self.state == WatchdogState::Disabled {
            return false;
        }
        self.arm();
        true
    }

    /// Record that the deadline for `generation` fired.
    ///
    /// Returns `true` exactly once per armed deadline: only when the
    /// generation is current and the watchdog is still `Armed`.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != WatchdogState::Armed {
            trace!(generation, current = self.generation, "ignoring stale expiry");
            return false;
        }
        debug!(interval_ms = millis(self.interval), "watchdog expired");
        self.set_state(WatchdogState::Expired);
        true
    }

    fn arm(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let notify = Arc::clone(&self.notify);
        self.timer
            .arm(self.interval, Box::new(move || notify(generation)));
        trace!(generation, interval_ms = millis(self.interval), "watchdog armed");
        self.set_state(WatchdogState::Armed);
    }

    fn set_state(&mut self, state: WatchdogState) {
        self.state = state;
        let _ = self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

//! One-shot shutdown latch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock};

/// Why the monitor is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// An external termination signal (ctrl-c, SIGTERM).
    Signal,
    /// The frame source ran out of frames.
    SourceExhausted,
    /// The frame source reported an error.
    SourceFailed,
}

impl ShutdownReason {
    /// Returns a short name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::SourceExhausted => "source_exhausted",
            Self::SourceFailed => "source_failed",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct TriggerState {
    fired: AtomicBool,
    reason: OnceLock<ShutdownReason>,
    wake: Sender<()>,
}

/// Cloneable handle that requests shutdown at most once.
///
/// [`request`](Self::request) only swaps an atomic flag and sends one
/// message on a channel, so it is safe to call from a signal handler
/// thread. The first caller wins; later calls are ignored.
#[derive(Clone)]
pub struct ShutdownTrigger {
    state: Arc<TriggerState>,
}

impl ShutdownTrigger {
    /// Creates a trigger and the receiver woken by the winning request.
    #[must_use]
    pub fn new() -> (Self, Receiver<()>) {
        let (wake, wake_rx) = mpsc::channel();
        let trigger = Self {
            state: Arc::new(TriggerState {
                fired: AtomicBool::new(false),
                reason: OnceLock::new(),
                wake,
            }),
        };
        (trigger, wake_rx)
    }

    /// Requests shutdown. Returns `true` if this call won the latch.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        if self.state.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.state.reason.set(reason);
        // The receiver is gone only after the controller has drained.
        let _ = self.state.wake.send(());
        true
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Returns the reason recorded by the winning request.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.state.reason.get().copied()
    }
}

impl fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("fired", &self.is_triggered())
            .field("reason", &self.reason())
            .finish()
    }
}

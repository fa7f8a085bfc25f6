//! Presence event publishing.
//!
//! Registries report discoveries and losses through the [`EventSink`] trait.
//! [`EventPublisher`] is the production sink: it serializes each event to a
//! JSON line and fans it out to every connected TCP subscriber without ever
//! blocking the caller. [`RecordingSink`] keeps events in memory.

mod endpoint;
mod server;

pub use endpoint::Endpoint;
pub use server::EventPublisher;

use crate::models::PresenceEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Destination for presence events.
///
/// Implementations must tolerate concurrent calls from the capture and
/// eviction threads and must not block for long: delivery is best effort.
pub trait EventSink: Send + Sync {
    /// Hands one event off for delivery.
    fn publish(&self, event: PresenceEvent);

    /// Stops delivery and releases transport resources.
    ///
    /// Called once during shutdown, after both worker threads have stopped.
    fn close(&self) {}
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PresenceEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<PresenceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`EventSink::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: PresenceEvent) {
        if self.is_closed() {
            return;
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

//! TCP fan-out of presence events.

use super::{Endpoint, EventSink};
use crate::models::PresenceEvent;
use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Maximum time a single write to a subscriber may take.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause after a failed accept before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
/// Grace period for subscriber tasks at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishes presence events as JSON lines to TCP subscribers.
///
/// Owns a small tokio runtime that accepts subscribers and writes to them.
/// [`publish`](EventSink::publish) only serializes the event and pushes it
/// into a bounded broadcast channel, so it never waits on the network: with
/// no subscribers the event is discarded, and a subscriber that falls more
/// than `capacity` events behind skips the events it missed.
pub struct EventPublisher {
    sender: broadcast::Sender<Arc<str>>,
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
    runtime: Mutex<Option<Runtime>>,
}

impl EventPublisher {
    /// Binds the publisher to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero capacity and
    /// [`Error::StartupFailure`] if the runtime cannot be built or the
    /// listener cannot be bound.
    pub fn bind(endpoint: &Endpoint, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidInput(
                "publisher capacity must be greater than zero".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("airtrack-publisher")
            .enable_all()
            .build()
            .map_err(|e| Error::StartupFailure {
                component: "publisher",
                cause: format!("runtime: {e}"),
            })?;

        let listener = runtime
            .block_on(TcpListener::bind((endpoint.host(), endpoint.port())))
            .map_err(|e| Error::StartupFailure {
                component: "publisher",
                cause: format!("{endpoint}: {e}"),
            })?;
        let local_addr = listener.local_addr().map_err(|e| Error::StartupFailure {
            component: "publisher",
            cause: format!("{endpoint}: {e}"),
        })?;

        let (sender, _receiver) = broadcast::channel(capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        runtime.spawn(accept_loop(listener, sender.clone(), shutdown_rx));

        info!(endpoint = %local_addr, capacity, "Event publisher bound");

        Ok(Self {
            sender,
            shutdown,
            local_addr,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Returns the address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns `true` once the publisher has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl EventSink for EventPublisher {
    fn publish(&self, event: PresenceEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(mut json) => {
                json.push('\n');
                Arc::<str>::from(json)
            },
            Err(e) => {
                warn!(error = %e, event = event.event_type(), "Failed to encode event");
                return;
            },
        };

        metrics::counter!("events_published_total", "event" => event.event_type()).increment(1);
        if self.sender.send(line).is_err() {
            metrics::counter!("events_unobserved_total").increment(1);
        }
    }

    fn close(&self) {
        let Some(runtime) = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let _ = self.shutdown.send(true);

        // Blocking shutdown is not allowed from inside another runtime.
        if tokio::runtime::Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        }
        debug!(endpoint = %self.local_addr, "Event publisher closed");
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    listener: TcpListener,
    sender: broadcast::Sender<Arc<str>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    metrics::counter!("publisher_subscribers_total").increment(1);
                    debug!(peer = %peer, "Subscriber connected");
                    tokio::spawn(serve_subscriber(
                        stream,
                        peer,
                        sender.subscribe(),
                        shutdown.clone(),
                    ));
                },
                Err(e) => {
                    warn!(error = %e, "Failed to accept subscriber");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                },
            },
        }
    }
}

async fn serve_subscriber(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut events: broadcast::Receiver<Arc<str>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Ok(line) => line,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("events_dropped_total").increment(skipped);
                    warn!(peer = %peer, skipped, "Subscriber lagging, events dropped");
                    continue;
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        match tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                debug!(peer = %peer, error = %e, "Subscriber disconnected");
                break;
            },
            Err(_) => {
                metrics::counter!("events_dropped_total").increment(1);
                warn!(peer = %peer, "Subscriber stalled, disconnecting");
                break;
            },
        }
    }
}

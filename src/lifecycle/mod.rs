//! Worker threads and graceful shutdown.
//!
//! The [`LifecycleController`] owns both registries, the capture thread and
//! the eviction thread. It moves through `Idle -> Running -> Draining ->
//! Terminated` exactly once.
//!
//! Shutdown is requested through a [`ShutdownTrigger`]: the ctrl-c handler,
//! the capture thread (on end of input or a source error) and tests all use
//! the same latch. Only the first request counts. Teardown never runs on the
//! requesting thread; [`LifecycleController::wait`] performs it on the
//! controlling thread after the latch fires.

mod summary;
mod trigger;

pub use summary::ShutdownSummary;
pub use trigger::{ShutdownReason, ShutdownTrigger};

use crate::capture::{FrameSource, NextFrame};
use crate::config::MonitorConfig;
use crate::models::EntityKind;
use crate::pipeline::Pipeline;
use crate::publish::EventSink;
use crate::registry::Registry;
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, not started.
    Idle,
    /// Worker threads are running.
    Running,
    /// Shutdown in progress.
    Draining,
    /// Everything stopped. Terminal.
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct FrameCounters {
    processed: AtomicU64,
    ignored: AtomicU64,
}

impl FrameCounters {
    fn record(&self, interesting: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_processed_total").increment(1);
        if !interesting {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frames_ignored_total").increment(1);
        }
    }
}

struct Workers {
    capture: JoinHandle<()>,
    eviction: JoinHandle<()>,
    eviction_stop: Sender<()>,
    source_live: bool,
}

struct ControllerState {
    phase: LifecycleState,
    wake: Option<Receiver<()>>,
    workers: Option<Workers>,
}

/// Owns the registries and worker threads of one monitor run.
pub struct LifecycleController {
    config: MonitorConfig,
    clients: Arc<Registry>,
    access_points: Arc<Registry>,
    sink: Arc<dyn EventSink>,
    trigger: ShutdownTrigger,
    counters: Arc<FrameCounters>,
    state: Mutex<ControllerState>,
}

impl LifecycleController {
    /// Creates an idle controller with empty registries reporting to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration does not validate.
    pub fn new(config: MonitorConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let smoothing = config.smoothing()?;
        let clients = Arc::new(Registry::new(
            EntityKind::Client,
            smoothing,
            Arc::clone(&sink),
        ));
        let access_points = Arc::new(Registry::new(
            EntityKind::AccessPoint,
            smoothing,
            Arc::clone(&sink),
        ));
        let (trigger, wake) = ShutdownTrigger::new();

        Ok(Self {
            config,
            clients,
            access_points,
            sink,
            trigger,
            counters: Arc::new(FrameCounters::default()),
            state: Mutex::new(ControllerState {
                phase: LifecycleState::Idle,
                wake: Some(wake),
                workers: None,
            }),
        })
    }

    /// Returns a handle for requesting shutdown from another thread.
    #[must_use]
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Returns the client registry.
    #[must_use]
    pub const fn clients(&self) -> &Arc<Registry> {
        &self.clients
    }

    /// Returns the access point registry.
    #[must_use]
    pub const fn access_points(&self) -> &Arc<Registry> {
        &self.access_points
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().phase
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the capture and eviction threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the controller is not idle, or
    /// [`Error::OperationFailed`] if a thread cannot be spawned.
    pub fn start(&self, source: Box<dyn FrameSource>) -> Result<()> {
        let mut state = self.lock();
        if state.phase != LifecycleState::Idle {
            return Err(Error::InvalidInput(format!(
                "cannot start a controller that is {}",
                state.phase
            )));
        }

        let (eviction_stop, stop_rx) = mpsc::channel();
        let eviction = {
            let clients = Arc::clone(&self.clients);
            let access_points = Arc::clone(&self.access_points);
            let period = self.config.eviction_period;
            let max_age = self.config.max_age;
            thread::Builder::new()
                .name("eviction".to_string())
                .spawn(move || run_eviction(&stop_rx, period, max_age, &clients, &access_points))
                .map_err(|e| spawn_error("eviction", &e))?
        };

        let source_live = source.is_live();
        let capture = {
            let pipeline = Pipeline::standard(
                Arc::clone(&self.clients),
                Arc::clone(&self.access_points),
            );
            let trigger = self.trigger.clone();
            let counters = Arc::clone(&self.counters);
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || run_capture(source, &pipeline, &trigger, &counters))
        };
        let capture = match capture {
            Ok(handle) => handle,
            Err(e) => {
                let _ = eviction_stop.send(());
                let _ = eviction.join();
                return Err(spawn_error("capture", &e));
            },
        };

        state.workers = Some(Workers {
            capture,
            eviction,
            eviction_stop,
            source_live,
        });
        state.phase = LifecycleState::Running;
        info!(
            eviction_period_secs = self.config.eviction_period.as_secs_f64(),
            max_age = self.config.max_age,
            source_live,
            "Monitor started"
        );
        Ok(())
    }

    /// Requests shutdown and drains. Equivalent to
    /// `trigger().request(reason)` followed by [`wait`](Self::wait).
    pub fn shutdown(&self, reason: ShutdownReason) -> Option<ShutdownSummary> {
        self.trigger.request(reason);
        self.wait()
    }

    /// Blocks until shutdown is requested, then tears everything down.
    ///
    /// Returns the summary from the one drain that actually ran. Calls on a
    /// controller that was never started, or that has already drained,
    /// return `None` without blocking.
    pub fn wait(&self) -> Option<ShutdownSummary> {
        let (wake, workers) = {
            let mut state = self.lock();
            if state.phase != LifecycleState::Running {
                return None;
            }
            (state.wake.take()?, state.workers.take()?)
        };

        // The trigger holds the sender, so this only returns once a request
        // has been made.
        let _ = wake.recv();
        let reason = self.trigger.reason().unwrap_or(ShutdownReason::Signal);
        self.lock().phase = LifecycleState::Draining;
        info!(reason = %reason, "Shutting down");

        let _ = workers.capture.join();
        let _ = workers.eviction_stop.send(());
        if workers.eviction.join().is_err() {
            error!("Eviction thread panicked");
        }
        self.sink.close();

        let limit = self.config.snapshot_limit;
        let summary = ShutdownSummary {
            reason,
            source_live: workers.source_live,
            frames_processed: self.counters.processed.load(Ordering::Relaxed),
            frames_ignored: self.counters.ignored.load(Ordering::Relaxed),
            clients: self.clients.snapshot(limit),
            access_points: self.access_points.snapshot(limit),
        };
        info!(
            reason = %summary.reason,
            frames_processed = summary.frames_processed,
            frames_ignored = summary.frames_ignored,
            clients = summary.clients.len,
            access_points = summary.access_points.len,
            "Shutdown complete"
        );

        self.lock().phase = LifecycleState::Terminated;
        Some(summary)
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            self.trigger.request(ShutdownReason::Signal);
            let _ = self.wait();
        }
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("clients", &self.clients)
            .field("access_points", &self.access_points)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

/// Fires the trigger if the capture thread unwinds, so `wait` never blocks
/// on a thread that can no longer request shutdown.
struct CaptureGuard<'a>(&'a ShutdownTrigger);

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Capture thread panicked");
            self.0.request(ShutdownReason::SourceFailed);
        }
    }
}

fn run_capture(
    mut source: Box<dyn FrameSource>,
    pipeline: &Pipeline,
    trigger: &ShutdownTrigger,
    counters: &FrameCounters,
) {
    let _guard = CaptureGuard(trigger);
    let description = source.describe();
    debug!(source = %description, "Capture thread started");
    while !trigger.is_triggered() {
        match source.next_frame() {
            Ok(NextFrame::Frame(frame)) => {
                let observation = pipeline.process(&frame);
                counters.record(observation.interesting);
            },
            Ok(NextFrame::Idle) => {},
            Ok(NextFrame::EndOfInput) => {
                if source.is_live() {
                    warn!(source = %description, "Live source stopped delivering frames");
                } else {
                    info!(source = %description, "End of input");
                }
                trigger.request(ShutdownReason::SourceExhausted);
                break;
            },
            Err(e) => {
                error!(source = %description, error = %e, "Frame source failed");
                trigger.request(ShutdownReason::SourceFailed);
                break;
            },
        }
    }
    debug!(source = %description, "Capture thread stopped");
}

fn run_eviction(
    stop: &Receiver<()>,
    period: Duration,
    max_age: u32,
    clients: &Registry,
    access_points: &Registry,
) {
    loop {
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                let clients_report = clients.age_and_evict(max_age);
                let aps_report = access_points.age_and_evict(max_age);
                debug!(
                    clients = clients_report.examined,
                    clients_evicted = clients_report.evicted.len(),
                    access_points = aps_report.examined,
                    access_points_evicted = aps_report.evicted.len(),
                    "Eviction pass"
                );
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn spawn_error(thread: &str, e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: format!("spawn_{thread}_thread"),
        cause: e.to_string(),
    }
}

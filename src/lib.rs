//! # Airtrack
//!
//! A passive Wi-Fi presence monitor.
//!
//! Airtrack consumes captured 802.11 frames, derives per-frame observations
//! about nearby client stations and access points, keeps an age-bounded
//! registry of every entity it has seen, and streams discovery and loss events
//! to subscribers.
//!
//! ## Features
//!
//! - Layered interpretation pipeline (radiotap, MAC header, AP, station)
//! - Two independently locked registries with freeze-then-age eviction
//! - Non-blocking JSON-lines event fan-out over TCP
//! - Live monitor-mode capture (`live-capture` feature) or pcap/pcapng replay
//! - At-most-once graceful shutdown driven by ctrl-c or end of input
//!
//! ## Example
//!
//! ```rust,ignore
//! use airtrack::capture::FileSource;
//! use airtrack::lifecycle::LifecycleController;
//! use airtrack::publish::{Endpoint, EventPublisher};
//!
//! let publisher = EventPublisher::bind(&Endpoint::parse("127.0.0.1:*")?, 1024)?;
//! let controller = LifecycleController::new(config, Arc::new(publisher))?;
//! controller.start(Box::new(FileSource::open("capture.pcap")?))?;
//! let summary = controller.wait();
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod capture;
pub mod config;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod publish;
pub mod registry;

// Re-exports for convenience
pub use config::MonitorConfig;
pub use lifecycle::{
    LifecycleController, LifecycleState, ShutdownReason, ShutdownSummary, ShutdownTrigger,
};
pub use models::{EntityKind, EntityRecord, FrameKind, HwAddr, Observation, PresenceEvent};
pub use pipeline::{Interpreter, Pipeline, Verdict};
pub use publish::{EventPublisher, EventSink};
pub use registry::{Registry, SightingOutcome, SignalSmoothing};

/// Error type for airtrack operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `StartupFailure` | Frame source cannot be opened, publisher cannot bind |
/// | `InvalidInput` | Bad endpoint string, bad config value, misordered pipeline |
/// | `OperationFailed` | I/O, thread spawn, logging or metrics initialization fails |
/// | `Source` | The frame source fails while reading |
/// | `FeatureNotEnabled` | Live capture requested without the `live-capture` feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A component could not be started.
    ///
    /// Raised when:
    /// - The capture device or replay file cannot be opened
    /// - The event publisher cannot bind its endpoint
    #[error("failed to start {component}: {cause}")]
    StartupFailure {
        /// The component that failed to start.
        component: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The frame source failed mid-capture.
    #[error("frame source error: {0}")]
    Source(String),

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

/// Result type alias for airtrack operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Frame sources.
//!
//! A [`FrameSource`] yields raw radiotap-encapsulated 802.11 frames with
//! their capture timestamps. Sources are driven from the capture thread and
//! must return periodically (with [`NextFrame::Idle`]) while waiting on a
//! live device so the thread can notice a shutdown request.

mod file;
mod live;
mod replay;

pub use file::FileSource;
pub use live::LiveSource;
pub use replay::ReplaySource;

use crate::Result;
use chrono::{DateTime, Utc};

/// Link-layer type for radiotap-encapsulated 802.11.
pub const LINKTYPE_IEEE802_11_RADIOTAP: i32 = 127;

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Raw bytes, starting with the radiotap header.
    pub data: Vec<u8>,
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Link-layer type the frame was captured with.
    pub linktype: i32,
}

impl CapturedFrame {
    /// Creates a radiotap frame.
    #[must_use]
    pub const fn new(data: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp,
            linktype: LINKTYPE_IEEE802_11_RADIOTAP,
        }
    }

    /// Overrides the link-layer type.
    #[must_use]
    pub const fn with_linktype(mut self, linktype: i32) -> Self {
        self.linktype = linktype;
        self
    }

    /// Returns `true` if the frame starts with a radiotap header.
    #[must_use]
    pub const fn is_radiotap(&self) -> bool {
        self.linktype == LINKTYPE_IEEE802_11_RADIOTAP
    }
}

/// Result of asking a source for its next frame.
#[derive(Debug)]
pub enum NextFrame {
    /// A frame was captured.
    Frame(CapturedFrame),
    /// Nothing arrived within the source's read timeout.
    Idle,
    /// The source has no more frames.
    EndOfInput,
}

/// A supplier of captured frames.
pub trait FrameSource: Send {
    /// Waits for the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Source`] if the underlying capture fails.
    fn next_frame(&mut self) -> Result<NextFrame>;

    /// Returns `true` for live devices, where end of input is unexpected.
    fn is_live(&self) -> bool;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Converts seconds plus a sub-second fraction into a UTC timestamp.
///
/// `units_per_sec` is the resolution of `fraction` (1e6 for microseconds).
/// Out-of-range values fall back to the Unix epoch.
pub(crate) fn timestamp_from_parts(secs: u64, fraction: u64, units_per_sec: u64) -> DateTime<Utc> {
    let nanos = if units_per_sec == 0 {
        0
    } else {
        u128::from(fraction) * 1_000_000_000 / u128::from(units_per_sec)
    };
    i64::try_from(secs)
        .ok()
        .zip(u32::try_from(nanos).ok())
        .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
        .unwrap_or_default()
}

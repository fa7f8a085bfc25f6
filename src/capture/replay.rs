//! In-memory frame source.

use super::{CapturedFrame, FrameSource, NextFrame};
use crate::Result;
use std::collections::VecDeque;
use std::time::Duration;

/// Replays a fixed list of frames.
///
/// With [`hold_open`](Self::hold_open) the source behaves like an idle live
/// device once the frames run out, returning [`NextFrame::Idle`] until it is
/// dropped.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<CapturedFrame>,
    live: bool,
    hold_open: Option<Duration>,
}

impl ReplaySource {
    /// Creates a source that yields `frames` in order, then ends.
    #[must_use]
    pub fn new(frames: impl IntoIterator<Item = CapturedFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            live: false,
            hold_open: None,
        }
    }

    /// Reports the source as a live device.
    #[must_use]
    pub const fn as_live(mut self) -> Self {
        self.live = true;
        self
    }

    /// Keeps the source open after the last frame, idling for `poll` per call.
    #[must_use]
    pub const fn hold_open(mut self, poll: Duration) -> Self {
        self.hold_open = Some(poll);
        self
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<NextFrame> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(NextFrame::Frame(frame));
        }
        match self.hold_open {
            Some(poll) => {
                std::thread::sleep(poll);
                Ok(NextFrame::Idle)
            },
            None => Ok(NextFrame::EndOfInput),
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn describe(&self) -> String {
        format!("replay of {} frames", self.frames.len())
    }
}

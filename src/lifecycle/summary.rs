//! Final diagnostics printed at shutdown.

use super::ShutdownReason;
use crate::registry::RegistrySnapshot;
use std::fmt;

/// What the monitor did before it stopped.
#[derive(Debug, Clone)]
pub struct ShutdownSummary {
    /// Why shutdown started.
    pub reason: ShutdownReason,
    /// Whether the frame source was a live device.
    pub source_live: bool,
    /// Frames run through the pipeline.
    pub frames_processed: u64,
    /// Frames that produced no sighting.
    pub frames_ignored: u64,
    /// Final client registry state.
    pub clients: RegistrySnapshot,
    /// Final access point registry state.
    pub access_points: RegistrySnapshot,
}

impl ShutdownSummary {
    /// Process exit code for this shutdown.
    ///
    /// A signal, or the end of a replay file, is a normal exit. A live
    /// device running dry or any source error is a failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.reason {
            ShutdownReason::Signal => 0,
            ShutdownReason::SourceExhausted if !self.source_live => 0,
            ShutdownReason::SourceExhausted | ShutdownReason::SourceFailed => 1,
        }
    }
}

impl fmt::Display for ShutdownSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shutdown reason: {}", self.reason)?;
        writeln!(
            f,
            "total frames: {} ignored: {}",
            self.frames_processed, self.frames_ignored
        )?;
        writeln!(f, "{}", self.clients)?;
        write!(f, "{}", self.access_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use test_case::test_case;

    fn empty(kind: EntityKind) -> RegistrySnapshot {
        RegistrySnapshot {
            kind,
            len: 0,
            added: 0,
            removed: 0,
            entries: Vec::new(),
        }
    }

    fn summary(reason: ShutdownReason, source_live: bool) -> ShutdownSummary {
        ShutdownSummary {
            reason,
            source_live,
            frames_processed: 12,
            frames_ignored: 5,
            clients: empty(EntityKind::Client),
            access_points: empty(EntityKind::AccessPoint),
        }
    }

    #[test_case(ShutdownReason::Signal, true, 0)]
    #[test_case(ShutdownReason::Signal, false, 0)]
    #[test_case(ShutdownReason::SourceExhausted, false, 0)]
    #[test_case(ShutdownReason::SourceExhausted, true, 1)]
    #[test_case(ShutdownReason::SourceFailed, false, 1)]
    fn test_exit_code(reason: ShutdownReason, live: bool, expected: u8) {
        assert_eq!(summary(reason, live).exit_code(), expected);
    }

    #[test]
    fn test_display_lists_counters() {
        let text = summary(ShutdownReason::Signal, true).to_string();
        assert!(text.starts_with("shutdown reason: signal\n"));
        assert!(text.contains("total frames: 12 ignored: 5"));
        assert!(text.contains("client registry"));
        assert!(text.contains("ap registry"));
    }
}

//! Per-frame observation record.

use super::HwAddr;
use chrono::{DateTime, Utc};

/// 802.11 frame classification as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameKind {
    /// Management beacon.
    Beacon,
    /// Management probe request.
    ProbeRequest,
    /// Management probe response.
    ProbeResponse,
    /// Any data frame (including `QoS` data).
    Data,
    /// Management frame of another subtype.
    OtherManagement,
    /// Control frame.
    Control,
    /// Not decoded yet, or reserved type.
    #[default]
    Unknown,
}

impl FrameKind {
    /// Classifies a frame from its type and subtype bits.
    #[must_use]
    pub const fn from_type_subtype(frame_type: u8, subtype: u8) -> Self {
        match (frame_type, subtype) {
            (0, 4) => Self::ProbeRequest,
            (0, 5) => Self::ProbeResponse,
            (0, 8) => Self::Beacon,
            (0, _) => Self::OtherManagement,
            (1, _) => Self::Control,
            (2, _) => Self::Data,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` for beacon and probe-response frames.
    #[must_use]
    pub const fn is_ap_advertisement(self) -> bool {
        matches!(self, Self::Beacon | Self::ProbeResponse)
    }

    /// Returns a short name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beacon => "beacon",
            Self::ProbeRequest => "probe_request",
            Self::ProbeResponse => "probe_response",
            Self::Data => "data",
            Self::OtherManagement => "management",
            Self::Control => "control",
            Self::Unknown => "unknown",
        }
    }
}

/// Attributes advertised by an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApAttributes {
    /// Operating channel, if known.
    pub channel: Option<u8>,
    /// Capability information field.
    pub capabilities: u16,
}

impl ApAttributes {
    /// ESS capability bit.
    pub const CAP_ESS: u16 = 0x0001;
    /// IBSS capability bit.
    pub const CAP_IBSS: u16 = 0x0002;
    /// Privacy (encryption required) capability bit.
    pub const CAP_PRIVACY: u16 = 0x0010;

    /// Returns `true` if the AP operates as part of an ESS.
    #[must_use]
    pub const fn is_ess(&self) -> bool {
        self.capabilities & Self::CAP_ESS != 0
    }

    /// Returns `true` if the network is ad-hoc.
    #[must_use]
    pub const fn is_ibss(&self) -> bool {
        self.capabilities & Self::CAP_IBSS != 0
    }

    /// Returns `true` if the AP requires encryption.
    #[must_use]
    pub const fn is_privacy(&self) -> bool {
        self.capabilities & Self::CAP_PRIVACY != 0
    }
}

/// Everything the pipeline learned about one captured frame.
///
/// Created empty for every frame, filled by the interpreters in order and
/// dropped once the pipeline returns.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,
    /// Transmitter address (addr2).
    pub source: Option<HwAddr>,
    /// Receiver address (addr1).
    pub destination: Option<HwAddr>,
    /// BSSID, when the header carries one.
    pub bssid: Option<HwAddr>,
    /// Frame kind.
    pub kind: FrameKind,
    /// Signal strength in dBm.
    pub signal_dbm: Option<i8>,
    /// Channel the radio was tuned to, from the radiotap header.
    pub phy_channel: Option<u8>,
    /// SSID carried by the frame, if any.
    pub ssid: Option<String>,
    /// Access point attributes for beacons and probe responses.
    pub ap: Option<ApAttributes>,
    /// Set when some interpreter recognized actionable content.
    pub interesting: bool,
}

impl Observation {
    /// Creates an empty observation for a frame captured at `timestamp`.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

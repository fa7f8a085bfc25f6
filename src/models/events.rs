//! Presence events published to subscribers.

use super::{EntityKind, HwAddr};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data carried by every presence event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// The entity's hardware address.
    pub address: HwAddr,
    /// Sighting time for discoveries, eviction time for losses.
    pub timestamp: DateTime<Utc>,
    /// Latest signal strength in dBm.
    pub signal_dbm: i8,
    /// Associated SSID, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssid: Option<String>,
}

/// Events emitted when an entity appears or disappears.
///
/// Serialized as a flat JSON object with an `event` tag, one per line on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// A client station was seen for the first time.
    ClientDiscovered(EventPayload),
    /// A client station aged out.
    ClientLost(EventPayload),
    /// An access point was seen for the first time.
    ApDiscovered(EventPayload),
    /// An access point aged out.
    ApLost(EventPayload),
}

impl PresenceEvent {
    /// Builds the discovery event for an entity kind.
    #[must_use]
    pub const fn discovered(kind: EntityKind, payload: EventPayload) -> Self {
        match kind {
            EntityKind::Client => Self::ClientDiscovered(payload),
            EntityKind::AccessPoint => Self::ApDiscovered(payload),
        }
    }

    /// Builds the loss event for an entity kind.
    #[must_use]
    pub const fn lost(kind: EntityKind, payload: EventPayload) -> Self {
        match kind {
            EntityKind::Client => Self::ClientLost(payload),
            EntityKind::AccessPoint => Self::ApLost(payload),
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ClientDiscovered(_) => "client_discovered",
            Self::ClientLost(_) => "client_lost",
            Self::ApDiscovered(_) => "ap_discovered",
            Self::ApLost(_) => "ap_lost",
        }
    }

    /// Returns the event payload.
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        match self {
            Self::ClientDiscovered(payload)
            | Self::ClientLost(payload)
            | Self::ApDiscovered(payload)
            | Self::ApLost(payload) => payload,
        }
    }

    /// Returns `true` for discovery events.
    #[must_use]
    pub const fn is_discovery(&self) -> bool {
        matches!(self, Self::ClientDiscovered(_) | Self::ApDiscovered(_))
    }
}

//! Data models for airtrack.
//!
//! Addresses, per-frame observations, registry records and the presence
//! events published to subscribers.

mod address;
mod entity;
mod events;
mod observation;

pub use address::HwAddr;
pub use entity::{EntityKind, EntityRecord};
pub use events::{EventPayload, PresenceEvent};
pub use observation::{ApAttributes, FrameKind, Observation};

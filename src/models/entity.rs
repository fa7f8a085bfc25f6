//! Registry-owned entity records.

use super::HwAddr;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The kind of entity a registry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A client station.
    Client,
    /// An access point.
    AccessPoint,
}

impl EntityKind {
    /// Returns the kind as a metrics/log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::AccessPoint => "ap",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked client or access point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    /// Hardware address (registry key).
    pub address: HwAddr,
    /// Eviction passes since the last sighting.
    pub age: u32,
    /// When the entity was first sighted.
    pub first_seen: DateTime<Utc>,
    /// When the entity was last sighted.
    pub last_seen: DateTime<Utc>,
    /// Signal strength of the latest sighting, in dBm.
    pub last_signal: i8,
    /// Smoothed signal strength, in dBm.
    pub avg_signal: f64,
    /// Distinct SSIDs observed for this entity.
    pub ssids: BTreeSet<String>,
    /// Number of sightings.
    pub sightings: u64,
    /// Sighted since the previous eviction pass.
    #[serde(skip)]
    pub(crate) fresh: bool,
}

impl EntityRecord {
    /// Creates a record for a first sighting.
    #[must_use]
    pub fn new(
        address: HwAddr,
        signal_dbm: i8,
        timestamp: DateTime<Utc>,
        ssid: Option<&str>,
    ) -> Self {
        Self {
            address,
            age: 0,
            first_seen: timestamp,
            last_seen: timestamp,
            last_signal: signal_dbm,
            avg_signal: f64::from(signal_dbm),
            ssids: ssid.map(str::to_string).into_iter().collect(),
            sightings: 1,
            fresh: true,
        }
    }

    /// Returns an arbitrary but stable representative SSID.
    #[must_use]
    pub fn primary_ssid(&self) -> Option<&str> {
        self.ssids.iter().next().map(String::as_str)
    }
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} age={} last={}dBm avg={:.1}dBm first_seen={}",
            self.address,
            self.age,
            self.last_signal,
            self.avg_signal,
            self.first_seen.format("%Y-%m-%dT%H:%M:%SZ"),
        )?;
        if !self.ssids.is_empty() {
            let ssids: Vec<&str> = self.ssids.iter().map(String::as_str).collect();
            write!(f, " ssids=[{}]", ssids.join(", "))?;
        }
        Ok(())
    }
}

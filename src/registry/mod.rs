//! Aging entity registries.
//!
//! A [`Registry`] holds every client or access point seen recently, keyed by
//! hardware address. Sightings from the capture path and aging passes from
//! the eviction thread are serialized by one mutex per registry; the two
//! registries never share a lock.
//!
//! # Eviction
//!
//! Eviction uses a freeze-then-age rule. On each pass, a record sighted since
//! the previous pass only loses its "fresh" mark and keeps age 0; every other
//! record ages by one. A record whose age then exceeds the maximum is
//! removed. A brand-new record therefore survives at least one full eviction
//! period, even with a maximum age of 0.
//!
//! # Events
//!
//! Creation and removal each produce exactly one [`PresenceEvent`]. Events
//! are built while the lock is held but handed to the [`EventSink`] only
//! after it is released.

mod smoothing;

pub use smoothing::SignalSmoothing;

use crate::models::{EntityKind, EntityRecord, EventPayload, HwAddr, PresenceEvent};
use crate::publish::EventSink;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, instrument};

/// Result of a single sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    /// The address was a sentinel; nothing changed.
    Rejected,
    /// A new record was created.
    Discovered,
    /// An existing record was refreshed.
    Updated,
}

/// Summary of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Records inspected.
    pub examined: usize,
    /// Records sighted since the previous pass (age left at 0).
    pub frozen: usize,
    /// Records whose age was incremented.
    pub aged: usize,
    /// Addresses removed by this pass.
    pub evicted: Vec<HwAddr>,
}

/// Bounded diagnostic view of a registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    /// Entity kind.
    pub kind: EntityKind,
    /// Number of live records.
    pub len: usize,
    /// Records created since startup.
    pub added: u64,
    /// Records evicted since startup.
    pub removed: u64,
    /// Up to `limit` records, in address order.
    pub entries: Vec<EntityRecord>,
}

impl fmt::Display for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} registry: {} live (added {}, removed {})",
            self.kind, self.len, self.added, self.removed
        )?;
        for entry in &self.entries {
            write!(f, "\n  {entry}")?;
        }
        if self.entries.len() < self.len {
            write!(f, "\n  ... {} more", self.len - self.entries.len())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<HwAddr, EntityRecord>,
    added: u64,
    removed: u64,
}

/// Concurrent aging map of entities of one kind.
pub struct Registry {
    kind: EntityKind,
    state: Mutex<RegistryState>,
    smoothing: SignalSmoothing,
    sink: Arc<dyn EventSink>,
}

impl Registry {
    /// Creates an empty registry that reports to `sink`.
    #[must_use]
    pub fn new(kind: EntityKind, smoothing: SignalSmoothing, sink: Arc<dyn EventSink>) -> Self {
        Self {
            kind,
            state: Mutex::new(RegistryState::default()),
            smoothing,
            sink,
        }
    }

    /// Returns the kind of entity this registry tracks.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    // A panic while holding the lock cannot leave a record half-written:
    // every mutation below is a plain field store, so the state is usable.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one sighting of `address`.
    ///
    /// Sentinel addresses are rejected without touching the registry. A new
    /// address creates a record and publishes a discovery event; a known
    /// address resets its age, updates its signal statistics and adds the
    /// SSID, without publishing anything.
    pub fn record_sighting(
        &self,
        address: HwAddr,
        signal_dbm: i8,
        timestamp: DateTime<Utc>,
        ssid: Option<&str>,
    ) -> SightingOutcome {
        if address.is_sentinel() {
            return SightingOutcome::Rejected;
        }

        let event = {
            let mut state = self.lock();
            if let Some(record) = state.entries.get_mut(&address) {
                record.age = 0;
                record.fresh = true;
                record.last_seen = timestamp;
                record.last_signal = signal_dbm;
                record.avg_signal = self.smoothing.next(record.avg_signal, signal_dbm);
                record.sightings = record.sightings.saturating_add(1);
                if let Some(ssid) = ssid {
                    if !record.ssids.contains(ssid) {
                        record.ssids.insert(ssid.to_string());
                    }
                }
                None
            } else {
                state.entries.insert(
                    address,
                    EntityRecord::new(address, signal_dbm, timestamp, ssid),
                );
                state.added += 1;
                metrics::gauge!("registry_entities", "kind" => self.kind.as_str())
                    .set(usize_to_f64(state.entries.len()));
                Some(PresenceEvent::discovered(
                    self.kind,
                    EventPayload {
                        address,
                        timestamp,
                        signal_dbm,
                        ssid: ssid.map(str::to_string),
                    },
                ))
            }
        };

        match event {
            Some(event) => {
                debug!(kind = %self.kind, address = %address, signal_dbm, "Entity discovered");
                metrics::counter!("registry_discovered_total", "kind" => self.kind.as_str())
                    .increment(1);
                self.sink.publish(event);
                SightingOutcome::Discovered
            },
            None => SightingOutcome::Updated,
        }
    }

    /// Runs one eviction pass using the current wall clock for loss events.
    pub fn age_and_evict(&self, max_age: u32) -> EvictionReport {
        self.age_and_evict_at(max_age, Utc::now())
    }

    /// Runs one eviction pass, stamping loss events with `now`.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn age_and_evict_at(&self, max_age: u32, now: DateTime<Utc>) -> EvictionReport {
        let start = Instant::now();
        let mut report = EvictionReport::default();
        let mut lost = Vec::new();

        {
            let mut state = self.lock();
            report.examined = state.entries.len();
            state.entries.retain(|address, record| {
                if record.fresh {
                    record.fresh = false;
                    report.frozen += 1;
                    return true;
                }
                record.age = record.age.saturating_add(1);
                report.aged += 1;
                if record.age <= max_age {
                    return true;
                }
                report.evicted.push(*address);
                lost.push(PresenceEvent::lost(
                    self.kind,
                    EventPayload {
                        address: *address,
                        timestamp: now,
                        signal_dbm: record.last_signal,
                        ssid: record.primary_ssid().map(str::to_string),
                    },
                ));
                false
            });
            state.removed += lost.len() as u64;
            metrics::gauge!("registry_entities", "kind" => self.kind.as_str())
                .set(usize_to_f64(state.entries.len()));
        }

        metrics::counter!("registry_lost_total", "kind" => self.kind.as_str())
            .increment(lost.len() as u64);
        metrics::histogram!("eviction_pass_duration_ms", "kind" => self.kind.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        for event in lost {
            debug!(kind = %self.kind, address = %event.payload().address, "Entity lost");
            self.sink.publish(event);
        }

        report
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if no records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns `true` if `address` is currently tracked.
    #[must_use]
    pub fn contains(&self, address: &HwAddr) -> bool {
        self.lock().entries.contains_key(address)
    }

    /// Returns a copy of the record for `address`.
    #[must_use]
    pub fn get(&self, address: &HwAddr) -> Option<EntityRecord> {
        self.lock().entries.get(address).cloned()
    }

    /// Returns counters and at most `limit` records.
    #[must_use]
    pub fn snapshot(&self, limit: usize) -> RegistrySnapshot {
        let state = self.lock();
        RegistrySnapshot {
            kind: self.kind,
            len: state.entries.len(),
            added: state.added,
            removed: state.removed,
            entries: state.entries.values().take(limit).cloned().collect(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("smoothing", &self.smoothing)
            .finish_non_exhaustive()
    }
}

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

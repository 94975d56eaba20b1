//! Presence tracking
//!
//! Keeps the set of stations currently in range with their last sighting.
//! A station joins on its first sighting and leaves once it has been idle
//! for longer than the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::wireless::MacAddr;

/// Outcome of recording a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// First sighting since the station was last absent
    Join,
    /// Station was already present
    Refresh,
}

/// Per-station entry
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub mac: MacAddr,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub sightings: u64,
}

/// Point-in-time view of a present station
#[derive(Debug, Clone, Serialize)]
pub struct PresentStation {
    pub mac: MacAddr,
    pub idle_secs: u64,
    pub present_secs: u64,
    pub sightings: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PresenceStats {
    pub joins: u64,
    pub leaves: u64,
    pub refreshes: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<MacAddr, PresenceEntry>,
    stats: PresenceStats,
}

/// Thread-safe presence cache
#[derive(Debug, Default)]
pub struct PresenceTracker {
    inner: Mutex<Inner>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `mac` at `now`
    pub fn observe(&self, mac: MacAddr, now: Instant) -> Presence {
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&mac) {
            // Sightings can arrive slightly out of order across sources
            if now > entry.last_seen {
                entry.last_seen = now;
            }
            entry.sightings += 1;
            inner.stats.refreshes += 1;
            return Presence::Refresh;
        }

        inner.entries.insert(
            mac,
            PresenceEntry {
                mac,
                first_seen: now,
                last_seen: now,
                sightings: 1,
            },
        );
        inner.stats.joins += 1;
        Presence::Join
    }

    /// Remove every station idle for longer than `ttl` and return them.
    ///
    /// Runs under the same lock as [`observe`](Self::observe), so a station
    /// refreshed before the sweep takes the lock is judged on its new timestamp.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> Vec<MacAddr> {
        let mut inner = self.inner.lock();
        let mut departed = Vec::new();

        inner.entries.retain(|mac, entry| {
            let idle = now.saturating_duration_since(entry.last_seen);
            if idle > ttl {
                departed.push(*mac);
                false
            } else {
                true
            }
        });

        inner.stats.leaves += departed.len() as u64;
        departed.sort();
        departed
    }

    pub fn is_present(&self, mac: &MacAddr) -> bool {
        self.inner.lock().entries.contains_key(mac)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PresenceStats {
        self.inner.lock().stats.clone()
    }

    /// Present stations, most recently seen first
    pub fn snapshot(&self, now: Instant) -> Vec<PresentStation> {
        let inner = self.inner.lock();
        let mut stations: Vec<PresentStation> = inner
            .entries
            .values()
            .map(|e| PresentStation {
                mac: e.mac,
                idle_secs: now.saturating_duration_since(e.last_seen).as_secs(),
                present_secs: now.saturating_duration_since(e.first_seen).as_secs(),
                sightings: e.sightings,
            })
            .collect();
        stations.sort_by_key(|s| (s.idle_secs, s.mac));
        stations
    }
}

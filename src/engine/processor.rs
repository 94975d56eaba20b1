//! Frame processor
//!
//! Turns classified frames and station sightings into presence
//! transitions. Only joins and leaves become events; refreshes just keep
//! the station alive, and HTTP User-Agent lines only feed the model
//! registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::models::{DeviceEvent, Origin};
use crate::presence::{ModelRegistry, Presence, PresenceTracker};
use crate::wireless::{classify, ClassifiedFrame, ClassifierConfig, MacAddr, StationSighting};

#[derive(Debug, Default)]
struct Counters {
    frames_seen: AtomicU64,
    frames_recognized: AtomicU64,
    user_agents: AtomicU64,
    joins: AtomicU64,
    leaves: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessorStats {
    pub frames_seen: u64,
    pub frames_recognized: u64,
    pub user_agents: u64,
    pub joins: u64,
    pub leaves: u64,
}

pub struct FrameProcessor {
    classifier: ClassifierConfig,
    tracker: Arc<PresenceTracker>,
    registry: Arc<ModelRegistry>,
    counters: Counters,
}

impl FrameProcessor {
    pub fn new(
        classifier: ClassifierConfig,
        tracker: Arc<PresenceTracker>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            classifier,
            tracker,
            registry,
            counters: Counters::default(),
        }
    }

    pub fn tracker(&self) -> &Arc<PresenceTracker> {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Classify one raw frame. Returns an event when a station joined.
    pub fn handle_frame(&self, raw: &[u8], now: Instant) -> Option<DeviceEvent> {
        self.counters.frames_seen.fetch_add(1, Ordering::Relaxed);

        match classify(raw, &self.classifier) {
            ClassifiedFrame::ProbeRequest { mac, ssid, rssi } => {
                self.counters.frames_recognized.fetch_add(1, Ordering::Relaxed);
                self.sighting(mac, Origin::Probe, rssi, ssid, now)
            }
            ClassifiedFrame::Beacon { mac, ssid } => {
                self.counters.frames_recognized.fetch_add(1, Ordering::Relaxed);
                self.sighting(mac, Origin::Beacon, 0, ssid, now)
            }
            ClassifiedFrame::HttpUserAgent { mac, user_agent } => {
                self.counters.frames_recognized.fetch_add(1, Ordering::Relaxed);
                self.counters.user_agents.fetch_add(1, Ordering::Relaxed);
                debug!("{} {}", mac, user_agent);
                self.registry.infer_and_store(mac, &user_agent);
                None
            }
            ClassifiedFrame::Unrecognized => None,
        }
    }

    /// Handle one line from the station feed
    pub fn handle_station(&self, sighting: &StationSighting, now: Instant) -> Option<DeviceEvent> {
        self.counters.frames_seen.fetch_add(1, Ordering::Relaxed);
        self.counters.frames_recognized.fetch_add(1, Ordering::Relaxed);
        self.sighting(
            sighting.mac,
            Origin::Proc,
            sighting.rssi,
            sighting.ssid.clone(),
            now,
        )
    }

    fn sighting(
        &self,
        mac: MacAddr,
        origin: Origin,
        rssi: i32,
        ssid: String,
        now: Instant,
    ) -> Option<DeviceEvent> {
        match self.tracker.observe(mac, now) {
            Presence::Refresh => None,
            Presence::Join => {
                self.counters.joins.fetch_add(1, Ordering::Relaxed);
                let model = self.registry.lookup(&mac);
                info!("{} joined ({}, rssi {}, ssid {:?})", mac, origin, rssi, ssid);
                Some(DeviceEvent::join(mac, origin, rssi, ssid, model))
            }
        }
    }

    /// Expire idle stations and build their leave events
    pub fn sweep(&self, now: Instant, ttl: Duration) -> Vec<DeviceEvent> {
        let departed = self.tracker.sweep(now, ttl);
        self.counters
            .leaves
            .fetch_add(departed.len() as u64, Ordering::Relaxed);

        departed
            .into_iter()
            .map(|mac| {
                info!("{} left", mac);
                DeviceEvent::leave(mac, self.registry.lookup(&mac))
            })
            .collect()
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            frames_seen: self.counters.frames_seen.load(Ordering::Relaxed),
            frames_recognized: self.counters.frames_recognized.load(Ordering::Relaxed),
            user_agents: self.counters.user_agents.load(Ordering::Relaxed),
            joins: self.counters.joins.load(Ordering::Relaxed),
            leaves: self.counters.leaves.load(Ordering::Relaxed),
        }
    }
}

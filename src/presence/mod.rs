//! Station presence and device models

pub mod registry;
pub mod tracker;

pub use registry::ModelRegistry;
pub use tracker::{Presence, PresenceEntry, PresenceStats, PresenceTracker, PresentStation};

//! Device model inference
//!
//! Maps station MACs to a vendor/model guessed from sniffed HTTP User-Agent
//! lines. Entries outlive presence: a station that leaves and comes back
//! keeps its model.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::wireless::MacAddr;

/// Ordered (vendor, keywords) table. First row with any matching keyword wins.
const MODEL_TABLE: &[(&str, &[&str])] = &[
    ("iPhone", &["iPhone"]),
    ("XiaoMi", &["MIUI", "XiaoMi", "MI 4LTE"]),
    ("HuaWei", &["HUAWEI", "Honor"]),
    ("ZTE", &["ZTE"]),
    ("Nexus", &["Nexus"]),
];

/// Thread-safe MAC -> model map
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<MacAddr, &'static str>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guess a vendor from a User-Agent line
    pub fn infer(user_agent: &str) -> Option<&'static str> {
        MODEL_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| user_agent.contains(k)))
            .map(|(vendor, _)| *vendor)
    }

    /// Infer a model from `user_agent` and remember it for `mac`.
    /// Returns the stored model when one was inferred.
    pub fn infer_and_store(&self, mac: MacAddr, user_agent: &str) -> Option<&'static str> {
        let model = Self::infer(user_agent)?;

        // Cheap read path for the common case of a repeat sighting
        if self.models.read().get(&mac) == Some(&model) {
            return Some(model);
        }

        let previous = self.models.write().insert(mac, model);
        if previous != Some(model) {
            debug!("Model for {} is {} (was {:?})", mac, model, previous);
        }
        Some(model)
    }

    /// Stored model for `mac`, empty when unknown
    pub fn lookup(&self, mac: &MacAddr) -> String {
        self.models
            .read()
            .get(mac)
            .map(|m| m.to_string())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Collector uplink
//!
//! Consumes device events from the pipeline and delivers them to the
//! collector. Holds at most one live connection:
//!
//! ```text
//! Disconnected ──▶ Connecting ──ok──▶ Connected
//!       ▲              │                  │
//!       └──retry wait──┘◀────send error───┘
//! ```
//!
//! Delivery is at-most-once: an event whose send fails is dropped and the
//! uplink reconnects.

pub mod cipher;
pub mod crc;
pub mod record;
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::pipeline::EventReceiver;
use crate::error::{CipherError, UplinkError};
use crate::models::DeviceEvent;
use crate::wireless::MacAddr;

pub use cipher::Tea;
pub use record::RecordDelivery;
pub use wire::{WireCodec, WireDelivery};

/// How events reach the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UplinkMode {
    /// Newline-delimited JSON over TCP
    Record,
    /// Encrypted datagrams over UDP
    #[default]
    Wire,
}

impl std::str::FromStr for UplinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "record" | "tcp" | "json" => Ok(UplinkMode::Record),
            "wire" | "udp" => Ok(UplinkMode::Wire),
            _ => Err(format!("Unknown uplink mode: {}", s)),
        }
    }
}

/// Uplink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    /// Deliver events to the collector. When off, events are only logged.
    pub enabled: bool,
    /// Collector address (host:port)
    pub server: String,
    pub mode: UplinkMode,
    /// Seconds between reconnect attempts
    pub retry_interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// Seconds one record write may take before the connection is dropped
    pub send_timeout_secs: u64,
    /// TEA key as 32 hex characters
    pub key: String,
    pub rounds: u32,
    pub longitude: String,
    pub latitude: String,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            mode: UplinkMode::default(),
            retry_interval_secs: 1,
            connect_timeout_secs: 3,
            send_timeout_secs: 3,
            key: "3ADA7521DBE2DBB311B44901A5C6EAD4".to_string(),
            rounds: cipher::DEFAULT_ROUNDS,
            longitude: "111.111111".to_string(),
            latitude: "111.111111".to_string(),
        }
    }
}

/// Transport for one delivery mode
#[async_trait]
pub trait Delivery: Send {
    fn name(&self) -> &'static str;

    /// Where events go
    fn target(&self) -> &str;

    async fn connect(&mut self) -> Result<(), UplinkError>;

    async fn send(&mut self, event: &DeviceEvent) -> Result<(), UplinkError>;

    async fn disconnect(&mut self);
}

/// Logs events instead of sending them
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &'static str {
        "log"
    }

    fn target(&self) -> &str {
        "log"
    }

    async fn connect(&mut self) -> Result<(), UplinkError> {
        Ok(())
    }

    async fn send(&mut self, event: &DeviceEvent) -> Result<(), UplinkError> {
        info!(
            "{} {} from={} rssi={} ssid={:?} model={:?}",
            event.kind, event.mac, event.origin, event.rssi, event.ssid, event.model
        );
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UplinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
}

/// Uplink statistics
#[derive(Debug, Clone, Serialize)]
pub struct UplinkStats {
    pub state: UplinkState,
    pub sent: u64,
    pub failed: u64,
    pub connects: u64,
    pub connect_failures: u64,
}

/// Cloneable read-only view of a running uplink
#[derive(Debug, Clone)]
pub struct UplinkHandle {
    state: Arc<RwLock<UplinkState>>,
    counters: Arc<Counters>,
}

impl UplinkHandle {
    pub fn state(&self) -> UplinkState {
        *self.state.read()
    }

    pub fn stats(&self) -> UplinkStats {
        UplinkStats {
            state: self.state(),
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            connects: self.counters.connects.load(Ordering::Relaxed),
            connect_failures: self.counters.connect_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Uplink {
    delivery: Box<dyn Delivery>,
    retry_interval: Duration,
    state: Arc<RwLock<UplinkState>>,
    counters: Arc<Counters>,
}

impl Uplink {
    pub fn new(delivery: Box<dyn Delivery>, retry_interval: Duration) -> Self {
        Self {
            delivery,
            retry_interval,
            state: Arc::new(RwLock::new(UplinkState::Disconnected)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Build the uplink for the configured mode
    pub fn from_config(
        config: &UplinkConfig,
        node_id: &str,
        prober: MacAddr,
    ) -> Result<Self, CipherError> {
        let retry = Duration::from_secs(config.retry_interval_secs);

        if !config.enabled {
            return Ok(Self::new(Box::new(LogDelivery), retry));
        }

        let delivery: Box<dyn Delivery> = match config.mode {
            UplinkMode::Record => Box::new(
                RecordDelivery::new(
                    &config.server,
                    node_id,
                    Duration::from_secs(config.connect_timeout_secs),
                )
                .with_send_timeout(Duration::from_secs(config.send_timeout_secs)),
            ),
            UplinkMode::Wire => {
                let tea = Tea::from_hex_key(&config.key, config.rounds)?;
                Box::new(WireDelivery::new(
                    &config.server,
                    WireCodec::new(tea),
                    prober,
                    &config.longitude,
                    &config.latitude,
                ))
            }
        };

        Ok(Self::new(delivery, retry))
    }

    pub fn handle(&self) -> UplinkHandle {
        UplinkHandle {
            state: self.state.clone(),
            counters: self.counters.clone(),
        }
    }

    fn set_state(&self, state: UplinkState) {
        *self.state.write() = state;
    }

    /// Run until shutdown fires or the pipeline closes
    pub async fn run(mut self, mut events: EventReceiver, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Uplink started: {} -> {}",
            self.delivery.name(),
            self.delivery.target()
        );

        loop {
            let state = *self.state.read();
            match state {
                UplinkState::Disconnected => {
                    self.set_state(UplinkState::Connecting);
                }
                UplinkState::Connecting => {
                    let result = tokio::select! {
                        _ = shutdown.recv() => break,
                        result = self.delivery.connect() => result,
                    };

                    match result {
                        Ok(()) => {
                            self.counters.connects.fetch_add(1, Ordering::Relaxed);
                            info!("Uplink connected to {}", self.delivery.target());
                            self.set_state(UplinkState::Connected);
                        }
                        Err(e) => {
                            self.counters.connect_failures.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                "Uplink connect to {} failed: {}, retrying in {:?}",
                                self.delivery.target(),
                                e,
                                self.retry_interval
                            );
                            self.set_state(UplinkState::Disconnected);

                            tokio::select! {
                                _ = shutdown.recv() => break,
                                _ = tokio::time::sleep(self.retry_interval) => {}
                            }
                        }
                    }
                }
                UplinkState::Connected => {
                    let event = tokio::select! {
                        _ = shutdown.recv() => break,
                        event = events.recv() => event,
                    };

                    let Some(event) = event else {
                        debug!("Event pipeline closed");
                        break;
                    };

                    let result = tokio::select! {
                        _ = shutdown.recv() => break,
                        result = self.delivery.send(&event) => result,
                    };

                    match result {
                        Ok(()) => {
                            self.counters.sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Dropping {} event for {}: {}", event.kind, event.mac, e);
                            self.delivery.disconnect().await;
                            self.set_state(UplinkState::Disconnected);
                        }
                    }
                }
            }
        }

        self.delivery.disconnect().await;
        self.set_state(UplinkState::Disconnected);
        info!("Uplink stopped");
    }
}

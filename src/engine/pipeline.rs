//! Event pipeline
//!
//! Bounded FIFO between frame processing and the uplink. A full queue
//! blocks the producer; nothing is dropped while the consumer is alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::DeviceEvent;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Queue capacity in events
    pub capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub capacity: usize,
    pub enqueued: u64,
    pub delivered: u64,
    /// Events refused because the consumer was gone
    pub dropped: u64,
    pub queued: u64,
}

pub struct EventPipeline {
    tx: mpsc::Sender<DeviceEvent>,
    rx: mpsc::Receiver<DeviceEvent>,
    counters: Arc<Counters>,
    capacity: usize,
}

impl EventPipeline {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx,
            counters: Arc::new(Counters::default()),
            capacity,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            counters: self.counters.clone(),
            capacity: self.capacity,
        }
    }

    pub fn split(self) -> (EventSender, EventReceiver) {
        (
            EventSender {
                tx: self.tx,
                counters: self.counters.clone(),
            },
            EventReceiver {
                rx: self.rx,
                counters: self.counters,
            },
        )
    }
}

/// Producer side, cloneable
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<DeviceEvent>,
    counters: Arc<Counters>,
}

impl EventSender {
    /// Enqueue from a non-async thread, blocking while the queue is full.
    /// Must not be called from inside the async runtime.
    pub fn send_blocking(&self, event: DeviceEvent) -> Result<(), DeviceEvent> {
        match self.tx.blocking_send(event) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::SendError(event)) => Err(self.refuse(event)),
        }
    }

    pub async fn send(&self, event: DeviceEvent) -> Result<(), DeviceEvent> {
        match self.tx.send(event).await {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::SendError(event)) => Err(self.refuse(event)),
        }
    }

    fn refuse(&self, event: DeviceEvent) -> DeviceEvent {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Event pipeline closed, dropping {} for {}", event.kind, event.mac);
        event
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<DeviceEvent>,
    counters: Arc<Counters>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        let event = self.rx.recv().await?;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Read-only view of pipeline counters
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    counters: Arc<Counters>,
    capacity: usize,
}

impl PipelineHandle {
    pub fn stats(&self) -> PipelineStats {
        let enqueued = self.counters.enqueued.load(Ordering::Relaxed);
        let delivered = self.counters.delivered.load(Ordering::Relaxed);
        PipelineStats {
            capacity: self.capacity,
            enqueued,
            delivered,
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queued: enqueued.saturating_sub(delivered),
        }
    }
}

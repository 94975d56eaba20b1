//! Presence engine
//!
//! Runs the sensing side of the agent and feeds the event pipeline.
//!
//! # Architecture
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌──────────────┐    ┌──────────┐
//! │ Frame source │───▶│   Processor   │───▶│   Pipeline   │───▶│  Uplink  │
//! │ (std thread) │    │ classify/track│    │ (bounded mpsc)│    │  (task)  │
//! └──────────────┘    └───────────────┘    └──────────────┘    └──────────┘
//!                             ▲                    ▲
//!                     ┌───────┴──────┐             │
//!                     │ Station feed │     ┌───────┴──────┐
//!                     │    (task)    │     │   Sweeper    │
//!                     └──────────────┘     │    (task)    │
//!                                          └──────────────┘
//! ```

pub mod pipeline;
pub mod processor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::wireless::capture::MAX_FRAME_LEN;
use crate::wireless::{FrameSource, ProcFeed};

pub use pipeline::{EventPipeline, EventReceiver, EventSender, PipelineConfig, PipelineHandle, PipelineStats};
pub use processor::{FrameProcessor, ProcessorStats};

const CAPTURE_BACKOFF_MIN: Duration = Duration::from_millis(10);
const CAPTURE_BACKOFF_MAX: Duration = Duration::from_secs(1);

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(CAPTURE_BACKOFF_MAX)
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Not started
    Stopped,
    /// Sources running
    Running,
    /// Shutting down
    Stopping,
    /// Frame source failed
    Error,
}

pub struct Engine {
    processor: Arc<FrameProcessor>,
    state: Arc<RwLock<EngineState>>,
    running: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(processor: Arc<FrameProcessor>) -> Self {
        Self {
            processor,
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
            tasks: Vec::new(),
        }
    }

    pub fn processor(&self) -> &Arc<FrameProcessor> {
        &self.processor
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Shared state cell, for status reporting
    pub fn state_cell(&self) -> Arc<RwLock<EngineState>> {
        self.state.clone()
    }

    fn mark_running(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut state = self.state.write();
        if *state == EngineState::Stopped {
            *state = EngineState::Running;
        }
    }

    /// Read frames on a dedicated thread until stopped or the source closes
    pub fn start_capture(&mut self, mut source: Box<dyn FrameSource>, events: EventSender) {
        self.mark_running();

        let processor = self.processor.clone();
        let running = self.running.clone();
        let state = self.state.clone();

        let handle = std::thread::spawn(move || {
            info!("Capture started");
            let mut buf = Vec::with_capacity(MAX_FRAME_LEN);

            let mut backoff = CAPTURE_BACKOFF_MIN;
            let mut failing = false;

            while running.load(Ordering::SeqCst) {
                let result = source.read_frame(&mut buf);
                if failing && result.is_ok() {
                    info!("Capture recovered");
                    failing = false;
                    backoff = CAPTURE_BACKOFF_MIN;
                    let mut state = state.write();
                    if *state == EngineState::Error {
                        *state = EngineState::Running;
                    }
                }

                match result {
                    Ok(true) => {
                        if let Some(event) = processor.handle_frame(&buf, Instant::now()) {
                            if events.send_blocking(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(CaptureError::Closed) => {
                        info!("Frame source closed");
                        break;
                    }
                    Err(e) => {
                        if failing {
                            debug!("Capture error: {}, retrying in {:?}", e, backoff);
                        } else {
                            error!("Capture error: {}", e);
                            failing = true;
                            let mut state = state.write();
                            if *state == EngineState::Running {
                                *state = EngineState::Error;
                            }
                        }
                        std::thread::sleep(backoff);
                        backoff = next_backoff(backoff);
                    }
                }
            }

            source.close();
            info!("Capture stopped");
        });

        self.capture_thread = Some(handle);
    }

    /// Poll the driver's station file at `interval`
    pub fn start_station_feed(
        &mut self,
        feed: ProcFeed,
        interval: Duration,
        events: EventSender,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        self.mark_running();
        let processor = self.processor.clone();

        self.tasks.push(tokio::spawn(async move {
            info!("Polling station feed {}", feed.path().display());
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {}
                }

                let stations = match feed.poll() {
                    Ok(stations) => stations,
                    Err(e) => {
                        warn!("Failed to read {}: {}", feed.path().display(), e);
                        continue;
                    }
                };

                let now = Instant::now();
                for station in &stations {
                    if let Some(event) = processor.handle_station(station, now) {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            debug!("Station feed stopped");
        }));
    }

    /// Expire idle stations every `interval`
    pub fn start_sweeper(
        &mut self,
        ttl: Duration,
        interval: Duration,
        events: EventSender,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let processor = self.processor.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {}
                }

                for event in processor.sweep(Instant::now(), ttl) {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }

            debug!("Sweeper stopped");
        }));
    }

    /// Tell the capture thread to close its source. It notices within one
    /// read timeout.
    pub fn halt_capture(&self) {
        *self.state.write() = EngineState::Stopping;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop capture first, then wait for the tasks.
    /// Tasks exit on the shutdown broadcast, which the caller sends.
    pub async fn stop(&mut self) {
        self.halt_capture();

        if let Some(handle) = self.capture_thread.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                error!("Capture thread panicked");
            }
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Engine task failed: {}", e);
            }
        }

        *self.state.write() = EngineState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

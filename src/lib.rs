pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod presence;
pub mod status;
pub mod uplink;
pub mod wireless;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use config::Config;
use engine::{Engine, EventPipeline, FrameProcessor, PipelineHandle};
use presence::{ModelRegistry, PresenceTracker};
use status::StatusState;
use uplink::{Uplink, UplinkHandle};
use wireless::{FrameSource, MacAddr, PcapSource, ProcFeed, SourceKind};

/// Node id used when the address file cannot be read
pub const FALLBACK_NODE_ID: &str = "test_node";

/// Read this node's id from a sysfs style address file
pub fn read_node_id<P: AsRef<Path>>(path: P) -> String {
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let id = content.trim();
            if id.is_empty() {
                FALLBACK_NODE_ID.to_string()
            } else {
                id.to_string()
            }
        }
        Err(e) => {
            warn!(
                "Failed to read node id from {}: {}",
                path.as_ref().display(),
                e
            );
            FALLBACK_NODE_ID.to_string()
        }
    }
}

/// Where sightings come from
pub enum Input {
    /// Raw 802.11 frames
    Frames(Box<dyn FrameSource>),
    /// Driver station file
    Stations(ProcFeed),
}

/// Top-level agent, owns every component
pub struct Agent {
    config: Config,
    node_id: String,
    engine: Engine,
    pipeline: Option<EventPipeline>,
    uplink: Option<Uplink>,
    pipeline_handle: PipelineHandle,
    uplink_handle: UplinkHandle,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl Agent {
    /// Build the agent. Fails on an unusable uplink cipher configuration.
    pub fn new(config: Config) -> Result<Self> {
        let node_id = match &config.general.node_id {
            Some(id) => id.clone(),
            None => read_node_id(&config.general.node_id_path),
        };
        let prober: MacAddr = node_id.parse().unwrap_or(MacAddr::ZERO);

        let uplink = Uplink::from_config(&config.uplink, &node_id, prober)
            .context("Invalid uplink cipher configuration")?;

        let processor = Arc::new(FrameProcessor::new(
            config.capture.classifier(),
            Arc::new(PresenceTracker::new()),
            Arc::new(ModelRegistry::new()),
        ));
        let pipeline = EventPipeline::from_config(&config.pipeline);
        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            node_id,
            engine: Engine::new(processor),
            pipeline_handle: pipeline.handle(),
            uplink_handle: uplink.handle(),
            pipeline: Some(pipeline),
            uplink: Some(uplink),
            shutdown_tx,
            tasks: Vec::new(),
            started_at: Instant::now(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn processor(&self) -> &Arc<FrameProcessor> {
        self.engine.processor()
    }

    pub fn status_state(&self) -> Arc<StatusState> {
        Arc::new(StatusState {
            node_id: self.node_id.clone(),
            started_at: self.started_at,
            engine: self.engine.state_cell(),
            processor: self.engine.processor().clone(),
            pipeline: self.pipeline_handle.clone(),
            uplink: self.uplink_handle.clone(),
        })
    }

    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline_handle
    }

    pub fn uplink(&self) -> &UplinkHandle {
        &self.uplink_handle
    }

    /// Open the configured input
    pub fn open_input(&self) -> Result<Input> {
        let capture = &self.config.capture;
        match capture.source {
            SourceKind::Pcap => {
                let source = PcapSource::open(&capture.pcap_settings()).with_context(|| {
                    format!("Failed to open capture on {}", capture.interface)
                })?;
                info!("Capturing on {}", source.interface());
                Ok(Input::Frames(Box::new(source)))
            }
            SourceKind::Proc => Ok(Input::Stations(ProcFeed::new(&capture.proc_path))),
        }
    }

    /// Start the uplink, the input, the sweeper and the status endpoint
    pub fn start(&mut self, input: Input) -> Result<()> {
        let pipeline = self.pipeline.take().context("Agent already started")?;
        let uplink = self.uplink.take().context("Agent already started")?;
        let (events, receiver) = pipeline.split();

        self.tasks
            .push(tokio::spawn(uplink.run(receiver, self.shutdown_tx.subscribe())));

        match input {
            Input::Frames(source) => self.engine.start_capture(source, events.clone()),
            Input::Stations(feed) => self.engine.start_station_feed(
                feed,
                self.config.capture.poll_interval(),
                events.clone(),
                self.shutdown_tx.subscribe(),
            ),
        }

        let presence = &self.config.presence;
        self.engine.start_sweeper(
            presence.ttl(),
            presence.sweep_interval(),
            events,
            self.shutdown_tx.subscribe(),
        );

        if self.config.status.enabled {
            let listen = self.config.status.listen.clone();
            let state = self.status_state();
            let shutdown = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = status::serve(&listen, state, shutdown).await {
                    error!("Status endpoint error: {:#}", e);
                }
            }));
        }

        info!(
            "Agent {} started (ttl {}s, sweep every {}s)",
            self.node_id, presence.ttl_secs, presence.sweep_interval_secs
        );
        Ok(())
    }

    /// Close the frame source, stop tasks, then close the uplink
    pub async fn stop(&mut self) {
        info!("Shutting down...");

        self.engine.halt_capture();
        let _ = self.shutdown_tx.send(());
        self.engine.stop().await;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Agent task failed: {}", e);
            }
        }

        info!("Agent stopped");
    }

    /// Run until interrupted
    pub async fn run(mut self) -> Result<()> {
        let input = self.open_input()?;
        self.start(input)?;

        let signal = tokio::signal::ctrl_c()
            .await
            .context("Failed to install CTRL+C handler");

        self.stop().await;
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_node_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("address");
        std::fs::write(&path, "00:0c:43:e1:76:2a\n").unwrap();
        assert_eq!(read_node_id(&path), "00:0c:43:e1:76:2a");

        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_node_id(&path), FALLBACK_NODE_ID);

        assert_eq!(read_node_id(dir.path().join("missing")), FALLBACK_NODE_ID);
    }

    #[test]
    fn test_agent_rejects_bad_cipher() {
        let mut config = Config::default();
        config.general.node_id = Some("n".into());
        config.uplink.enabled = true;
        config.uplink.server = "127.0.0.1:9".into();
        config.uplink.rounds = 0;

        let err = Agent::new(config).err().unwrap();
        assert!(format!("{:#}", err).contains("invalid round count 0"));
    }

    #[tokio::test]
    async fn test_agent_start_twice_fails() {
        let mut config = Config::default();
        config.general.node_id = Some("n".into());

        let mut agent = Agent::new(config).unwrap();
        agent
            .start(Input::Frames(Box::new(wireless::ReplaySource::default())))
            .unwrap();
        assert!(agent
            .start(Input::Frames(Box::new(wireless::ReplaySource::default())))
            .is_err());
        agent.stop().await;
    }
}

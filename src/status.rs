//! Local status endpoint
//!
//! JSON over HTTP for on-box inspection:
//! - `GET /api/status`: counters and component states
//! - `GET /api/devices`: stations currently present

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::engine::{EngineState, FrameProcessor, PipelineHandle, PipelineStats, ProcessorStats};
use crate::uplink::{UplinkHandle, UplinkStats};
use crate::wireless::MacAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Everything the handlers read
pub struct StatusState {
    pub node_id: String,
    pub started_at: Instant,
    pub engine: Arc<RwLock<EngineState>>,
    pub processor: Arc<FrameProcessor>,
    pub pipeline: PipelineHandle,
    pub uplink: UplinkHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub node_id: String,
    pub uptime_secs: u64,
    pub engine: EngineState,
    pub present: usize,
    pub known_models: usize,
    pub processor: ProcessorStats,
    pub pipeline: PipelineStats,
    pub uplink: UplinkStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub mac: MacAddr,
    pub model: String,
    pub idle_secs: u64,
    pub present_secs: u64,
    pub sightings: u64,
}

impl StatusState {
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            node_id: self.node_id.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            engine: *self.engine.read(),
            present: self.processor.tracker().len(),
            known_models: self.processor.registry().len(),
            processor: self.processor.stats(),
            pipeline: self.pipeline.stats(),
            uplink: self.uplink.stats(),
        }
    }

    pub fn devices(&self) -> Vec<DeviceView> {
        let registry = self.processor.registry();
        self.processor
            .tracker()
            .snapshot(Instant::now())
            .into_iter()
            .map(|station| DeviceView {
                model: registry.lookup(&station.mac),
                mac: station.mac,
                idle_secs: station.idle_secs,
                present_secs: station.present_secs,
                sightings: station.sightings,
            })
            .collect()
    }
}

pub async fn get_status(State(state): State<Arc<StatusState>>) -> Json<AgentStatus> {
    Json(state.status())
}

pub async fn get_devices(State(state): State<Arc<StatusState>>) -> Json<Vec<DeviceView>> {
    Json(state.devices())
}

pub fn router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/devices", get(get_devices))
        .with_state(state)
}

/// Serve until the shutdown broadcast fires
pub async fn serve(
    listen: &str,
    state: Arc<StatusState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {}", listen))?;
    info!("Status endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("Status endpoint failed")?;

    Ok(())
}

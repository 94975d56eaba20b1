use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::PipelineConfig;
use crate::status::StatusConfig;
use crate::uplink::{cipher, UplinkConfig};
use crate::wireless::{ClassifierConfig, PcapSettings, SourceKind};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub uplink: UplinkConfig,

    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/wifiprobe/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("wifiprobe/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.is_file() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Check the settings the selected source and uplink need
    pub fn validate(&self) -> Result<()> {
        if self.capture.source == SourceKind::Pcap && self.capture.interface.is_empty() {
            anyhow::bail!("need monitor interface name");
        }
        if self.uplink.server.is_empty() {
            anyhow::bail!("need server address");
        }
        if self.uplink.rounds != cipher::DEFAULT_ROUNDS {
            anyhow::bail!(
                "uplink rounds must be {} (Feistel rounds, i.e. {} cycles), got {}",
                cipher::DEFAULT_ROUNDS,
                cipher::DEFAULT_ROUNDS / 2,
                self.uplink.rounds
            );
        }
        if self.presence.ttl_secs == 0 || self.presence.sweep_interval_secs == 0 {
            anyhow::bail!("presence ttl and sweep interval must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// File holding this node's MAC address
    #[serde(default = "default_node_id_path")]
    pub node_id_path: PathBuf,

    /// Fixed node id, overrides `node_id_path`
    #[serde(default)]
    pub node_id: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            node_id_path: default_node_id_path(),
            node_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub source: SourceKind,

    /// Monitor mode interface
    #[serde(default)]
    pub interface: String,

    /// Station file polled by the `proc` source
    #[serde(default = "default_proc_path")]
    pub proc_path: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: i32,

    /// Track access points from beacons
    #[serde(default)]
    pub beacons: bool,

    #[serde(default = "default_true")]
    pub probe_requests: bool,

    /// Sniff plaintext HTTP for User-Agent lines
    #[serde(default)]
    pub http_sniff: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            interface: String::new(),
            proc_path: default_proc_path(),
            poll_interval_ms: default_poll_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            buffer_size: default_buffer_size(),
            beacons: false,
            probe_requests: true,
            http_sniff: false,
        }
    }
}

impl CaptureConfig {
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            beacons: self.beacons,
            probe_requests: self.probe_requests,
            http_sniff: self.http_sniff,
        }
    }

    pub fn pcap_settings(&self) -> PcapSettings {
        let mut settings = PcapSettings::for_interface(&self.interface);
        settings.buffer_size = self.buffer_size;
        settings.read_timeout = Duration::from_millis(self.read_timeout_ms);
        settings
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Idle seconds before a station is considered gone
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl PresenceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_node_id_path() -> PathBuf {
    PathBuf::from("/sys/class/net/ra0/address")
}

fn default_proc_path() -> PathBuf {
    PathBuf::from("/proc/nexfi_proc")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_buffer_size() -> i32 {
    1 << 20
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5
}

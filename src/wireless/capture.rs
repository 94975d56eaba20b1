//! Frame sources
//!
//! Captures raw 802.11 frames from a monitor mode interface using pcap, or
//! polls a proc file where the driver publishes already-decoded stations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::frame::MacAddr;
use crate::error::CaptureError;

/// Link MTU plus radio header headroom
pub const MAX_FRAME_LEN: usize = 2048;

/// Where sightings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Live monitor-mode capture
    #[default]
    Pcap,
    /// Driver proc file with `mac,rssi,ssid` lines
    Proc,
}

/// Blocking provider of raw captured frames
pub trait FrameSource: Send {
    /// Read the next frame into `buf`. Returns `Ok(false)` when the read
    /// timed out without a frame, so callers can check their stop flag.
    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<bool, CaptureError>;

    /// Release the underlying handle
    fn close(&mut self);
}

/// pcap capture settings
#[derive(Debug, Clone)]
pub struct PcapSettings {
    pub interface: String,
    pub snaplen: i32,
    pub buffer_size: i32,
    pub read_timeout: Duration,
}

impl PcapSettings {
    pub fn for_interface(name: &str) -> Self {
        Self {
            interface: name.to_string(),
            snaplen: MAX_FRAME_LEN as i32,
            buffer_size: 1 << 20,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Live capture on a monitor mode interface
pub struct PcapSource {
    cap: Option<pcap::Capture<pcap::Active>>,
    interface: String,
}

impl PcapSource {
    pub fn open(settings: &PcapSettings) -> Result<Self, CaptureError> {
        let cap = pcap::Capture::from_device(settings.interface.as_str())
            .map_err(|e| CaptureError::Pcap(e.to_string()))?
            .promisc(true)
            .immediate_mode(true)
            .snaplen(settings.snaplen)
            .buffer_size(settings.buffer_size)
            .timeout(settings.read_timeout.as_millis() as i32)
            .open()
            .map_err(|e| CaptureError::Pcap(e.to_string()))?;

        Ok(Self {
            cap: Some(cap),
            interface: settings.interface.clone(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameSource for PcapSource {
    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<bool, CaptureError> {
        let cap = self.cap.as_mut().ok_or(CaptureError::Closed)?;

        match cap.next_packet() {
            Ok(packet) => {
                buf.clear();
                buf.extend_from_slice(packet.data);
                Ok(true)
            }
            Err(pcap::Error::TimeoutExpired) => Ok(false),
            Err(e) => Err(CaptureError::Pcap(e.to_string())),
        }
    }

    fn close(&mut self) {
        self.cap = None;
    }
}

/// In-memory source, replays a fixed list of frames then reports closed
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: std::collections::VecDeque<Vec<u8>>,
}

impl ReplaySource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for ReplaySource {
    fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<bool, CaptureError> {
        let frame = self.frames.pop_front().ok_or(CaptureError::Closed)?;
        buf.clear();
        buf.extend_from_slice(&frame);
        Ok(true)
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

/// One station line from the driver proc file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSighting {
    pub mac: MacAddr,
    pub rssi: i32,
    pub ssid: String,
}

/// Poller for the driver's station proc file
#[derive(Debug, Clone)]
pub struct ProcFeed {
    path: PathBuf,
}

impl ProcFeed {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the current contents
    pub fn poll(&self) -> Result<Vec<StationSighting>, CaptureError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse_station_lines(&content))
    }
}

/// Parse `mac,rssi,ssid` lines. Malformed lines are skipped.
pub fn parse_station_lines(content: &str) -> Vec<StationSighting> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let sighting = parse_station_line(line);
            if sighting.is_none() {
                debug!("Skipping malformed station line: {:?}", line);
            }
            sighting
        })
        .collect()
}

fn parse_station_line(line: &str) -> Option<StationSighting> {
    let mut fields = line.splitn(3, ',');
    let mac = fields.next()?.trim().parse().ok()?;
    let rssi = fields.next()?.trim().parse().ok()?;
    let ssid = fields.next().unwrap_or("").trim_end().to_string();
    Some(StationSighting { mac, rssi, ssid })
}

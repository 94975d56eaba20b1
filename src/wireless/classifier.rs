//! Frame classification
//!
//! Turns a raw monitor-mode capture into a typed sighting. Offsets are fixed
//! and measured from the radio header length stored in byte 2 of the capture.
//! Classification is total: short, truncated or lying frames come back as
//! [`ClassifiedFrame::Unrecognized`], never as a panic or an error.

use serde::{Deserialize, Serialize};

use super::frame::{MacAddr, FC_BEACON, FC_PROBE_REQUEST, FC_QOS_DATA};
use super::http::{sniff_user_agent, QOS_HEADER_LEN};

/// Offset of the radio header length byte
const RADIO_HDR_LEN_OFFSET: usize = 2;
/// Transmitter address, relative to the MAC header
const TA_OFFSET: usize = 10;
/// Absolute offset of the signal byte in the radio header
const RSSI_OFFSET: usize = 30;
/// SSID element length byte in a beacon (24-byte header + 12 fixed bytes + element id)
const BEACON_SSID_LEN_OFFSET: usize = 37;
/// SSID element length byte in a probe request (24-byte header + element id)
const PROBE_SSID_LEN_OFFSET: usize = 25;

/// Which branches of the classifier are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub beacons: bool,
    pub probe_requests: bool,
    pub http_sniff: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            beacons: false,
            probe_requests: true,
            http_sniff: false,
        }
    }
}

impl ClassifierConfig {
    /// Every branch enabled
    pub fn all() -> Self {
        Self {
            beacons: true,
            probe_requests: true,
            http_sniff: true,
        }
    }
}

/// Result of classifying one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedFrame {
    Beacon {
        mac: MacAddr,
        ssid: String,
    },
    ProbeRequest {
        mac: MacAddr,
        ssid: String,
        rssi: i32,
    },
    HttpUserAgent {
        mac: MacAddr,
        user_agent: String,
    },
    Unrecognized,
}

impl ClassifiedFrame {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ClassifiedFrame::Unrecognized)
    }

    pub fn mac(&self) -> Option<MacAddr> {
        match self {
            ClassifiedFrame::Beacon { mac, .. }
            | ClassifiedFrame::ProbeRequest { mac, .. }
            | ClassifiedFrame::HttpUserAgent { mac, .. } => Some(*mac),
            ClassifiedFrame::Unrecognized => None,
        }
    }
}

/// Classify a raw capture
pub fn classify(raw: &[u8], config: &ClassifierConfig) -> ClassifiedFrame {
    let Some(&hdr_len) = raw.get(RADIO_HDR_LEN_OFFSET) else {
        return ClassifiedFrame::Unrecognized;
    };
    let hdr_len = hdr_len as usize;
    let Some(&fc) = raw.get(hdr_len) else {
        return ClassifiedFrame::Unrecognized;
    };

    let parsed = match fc {
        FC_BEACON if config.beacons => parse_beacon(raw, hdr_len),
        FC_PROBE_REQUEST if config.probe_requests => parse_probe_request(raw, hdr_len),
        FC_QOS_DATA if config.http_sniff => parse_qos_http(raw, hdr_len),
        _ => None,
    };

    parsed.unwrap_or(ClassifiedFrame::Unrecognized)
}

fn transmitter(raw: &[u8], hdr_len: usize) -> Option<MacAddr> {
    MacAddr::from_slice(raw.get(hdr_len + TA_OFFSET..)?)
}

/// Read a length-prefixed SSID whose length byte sits at `len_at`
fn ssid_at(raw: &[u8], len_at: usize) -> Option<String> {
    let len = *raw.get(len_at)? as usize;
    let start = len_at + 1;
    let bytes = raw.get(start..start + len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn parse_beacon(raw: &[u8], hdr_len: usize) -> Option<ClassifiedFrame> {
    let mac = transmitter(raw, hdr_len)?;
    let ssid = ssid_at(raw, hdr_len + BEACON_SSID_LEN_OFFSET)?;
    Some(ClassifiedFrame::Beacon { mac, ssid })
}

fn parse_probe_request(raw: &[u8], hdr_len: usize) -> Option<ClassifiedFrame> {
    let mac = transmitter(raw, hdr_len)?;
    let ssid = ssid_at(raw, hdr_len + PROBE_SSID_LEN_OFFSET)?;
    let signal = *raw.get(RSSI_OFFSET)?;
    Some(ClassifiedFrame::ProbeRequest {
        mac,
        ssid,
        rssi: rssi_from_byte(signal),
    })
}

fn parse_qos_http(raw: &[u8], hdr_len: usize) -> Option<ClassifiedFrame> {
    let mac = transmitter(raw, hdr_len)?;
    let llc = raw.get(hdr_len + QOS_HEADER_LEN..)?;
    let user_agent = sniff_user_agent(llc)?;
    Some(ClassifiedFrame::HttpUserAgent { mac, user_agent })
}

/// Signal byte to dBm: `-(256 - byte)`, always in `[-256, -1]`
pub fn rssi_from_byte(byte: u8) -> i32 {
    byte as i32 - 256
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic capture builders shared by unit tests

    use super::*;

    pub const HDR_LEN: usize = 24;

    fn radio_header(buf: &mut Vec<u8>, fc: u8) {
        buf.resize(HDR_LEN, 0);
        buf[RADIO_HDR_LEN_OFFSET] = HDR_LEN as u8;
        buf.push(fc);
        buf.push(0x00);
    }

    fn put_ta(buf: &mut Vec<u8>, mac: [u8; 6]) {
        let at = HDR_LEN + TA_OFFSET;
        if buf.len() < at + 6 {
            buf.resize(at + 6, 0);
        }
        buf[at..at + 6].copy_from_slice(&mac);
    }

    /// Probe request with `signal` at the absolute RSSI offset
    pub fn probe_request(mac: [u8; 6], ssid: &str, signal: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        radio_header(&mut buf, FC_PROBE_REQUEST);
        put_ta(&mut buf, mac);
        buf.resize(HDR_LEN + PROBE_SSID_LEN_OFFSET, 0);
        buf.push(ssid.len() as u8);
        buf.extend_from_slice(ssid.as_bytes());
        buf[RSSI_OFFSET] = signal;
        buf
    }

    pub fn beacon(mac: [u8; 6], ssid: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        radio_header(&mut buf, FC_BEACON);
        put_ta(&mut buf, mac);
        buf.resize(HDR_LEN + BEACON_SSID_LEN_OFFSET, 0);
        buf.push(ssid.len() as u8);
        buf.extend_from_slice(ssid.as_bytes());
        buf
    }

    /// QoS data frame carrying an HTTP GET with the given header block
    pub fn qos_http(mac: [u8; 6], http: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        radio_header(&mut buf, FC_QOS_DATA);
        put_ta(&mut buf, mac);
        buf.resize(HDR_LEN + QOS_HEADER_LEN, 0);

        buf.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x08, 0x00]);
        let total = (20 + 32 + http.len()) as u16;
        let mut ip = [0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total.to_be_bytes());
        ip[9] = 6;
        buf.extend_from_slice(&ip);
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(http);
        buf
    }
}

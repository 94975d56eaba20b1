//! Synthetic capture generator for integration tests
#![allow(dead_code)]

use std::time::Duration;

use wifiprobe::config::Config;
use wifiprobe::uplink::UplinkMode;

/// Radio header length used by every generated frame
pub const HDR_LEN: usize = 24;

fn header(fc: u8, mac: [u8; 6]) -> Vec<u8> {
    let mut buf = vec![0u8; HDR_LEN];
    buf[2] = HDR_LEN as u8;
    buf.push(fc);
    buf.push(0x00);
    buf.resize(HDR_LEN + 10, 0);
    buf.extend_from_slice(&mac);
    buf
}

/// Probe request; `signal` lands at absolute offset 30
pub fn probe_request(mac: [u8; 6], ssid: &str, signal: u8) -> Vec<u8> {
    let mut buf = header(0x40, mac);
    buf.resize(HDR_LEN + 25, 0);
    buf.push(ssid.len() as u8);
    buf.extend_from_slice(ssid.as_bytes());
    buf[30] = signal;
    buf
}

/// QoS data frame carrying a plaintext HTTP GET
pub fn http_get(mac: [u8; 6], user_agent: &str) -> Vec<u8> {
    let http = format!(
        "GET /generate_204 HTTP/1.1\r\nHost: connect.rom.miui.com\r\nUser-Agent: {}\r\nConnection: keep-alive\r\n\r\n",
        user_agent
    );

    let mut buf = header(0x88, mac);
    buf.resize(HDR_LEN + 26, 0);
    buf.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x08, 0x00]);

    let total = (20 + 32 + http.len()) as u16;
    let mut ip = [0u8; 20];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&total.to_be_bytes());
    ip[8] = 64;
    ip[9] = 6;
    buf.extend_from_slice(&ip);
    buf.extend_from_slice(&[0u8; 32]);
    buf.extend_from_slice(http.as_bytes());
    buf
}

pub fn station(i: u8) -> [u8; 6] {
    [0x02, 0x1A, 0x2B, 0x3C, 0x4D, i]
}

/// `rounds` passes over `stations` MACs in a scrambled order with repeats
pub fn probe_storm(stations: u8, rounds: usize) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut seed = 0x9E37_79B9_u32;
    for _ in 0..rounds {
        for _ in 0..stations {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let i = (seed % stations as u32) as u8;
            frames.push(probe_request(station(i), "Guest", 180 + i));
        }
    }
    // Every station at least once
    for i in 0..stations {
        frames.push(probe_request(station(i), "Guest", 200));
    }
    frames
}

/// Agent config pointed at a local collector
pub fn agent_config(server: &str, mode: UplinkMode) -> Config {
    let mut config = Config::default();
    config.general.node_id = Some("00:0c:43:e1:76:2a".to_string());
    config.uplink.enabled = true;
    config.uplink.server = server.to_string();
    config.uplink.mode = mode;
    config
}

pub const WAIT: Duration = Duration::from_secs(10);

//! Encrypted wire message
//!
//! ```text
//! +-------+---------+---------+---------+---------+-----+----------+-----+------------------+-------+-----+
//! | start | major   | minor   | primary | second. | enc | body len | pad | body (encrypted) | crc32 | end |
//! | 1     | 2       | 2       | 2       | 2       | 1   | 4        | 1   | 136              | 4     | 1   |
//! +-------+---------+---------+---------+---------+-----+----------+-----+------------------+-------+-----+
//! ```
//!
//! Integers are big-endian. The CRC covers the header and the encrypted body.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{UplinkError, WireError};
use crate::models::{DeviceEvent, StationReport};
use crate::wireless::MacAddr;

use super::cipher::{Tea, BLOCK_SIZE};
use super::crc::Crc32;
use super::Delivery;

pub const START_MARKER: u8 = 0x4E;
pub const END_MARKER: u8 = 0x47;
pub const MAJOR_VERSION: u16 = 0x0001;
pub const MINOR_VERSION: u16 = 0x0001;
pub const PRIMARY_COMMAND: u16 = 0x0002;
pub const SECONDARY_COMMAND: u16 = 0x0000;
pub const ENCRYPT_TEA: u8 = 0x01;

pub const HEADER_LEN: usize = 15;
pub const TRAILER_LEN: usize = 5;

// Body field widths
const TIMESTAMP_LEN: usize = 20;
const MAC_LEN: usize = 6;
const RSSI_LEN: usize = 8;
const COORD_LEN: usize = 12;
const RESERVED_LEN: usize = 32 + 32 + 4 + 4;

pub const BODY_LEN: usize =
    TIMESTAMP_LEN + MAC_LEN + MAC_LEN + RSSI_LEN + COORD_LEN + COORD_LEN + RESERVED_LEN;
pub const PADDING: usize = (BLOCK_SIZE - BODY_LEN % BLOCK_SIZE) % BLOCK_SIZE;
pub const MESSAGE_LEN: usize = HEADER_LEN + BODY_LEN + PADDING + TRAILER_LEN;

/// Fixed header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub primary_command: u16,
    pub secondary_command: u16,
    pub encrypt_type: u8,
    pub body_len: u32,
    pub padding: u8,
}

impl Default for WireHeader {
    fn default() -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            primary_command: PRIMARY_COMMAND,
            secondary_command: SECONDARY_COMMAND,
            encrypt_type: ENCRYPT_TEA,
            body_len: BODY_LEN as u32,
            padding: PADDING as u8,
        }
    }
}

impl WireHeader {
    fn write(&self, out: &mut Vec<u8>) {
        out.push(START_MARKER);
        out.extend_from_slice(&self.major_version.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.primary_command.to_be_bytes());
        out.extend_from_slice(&self.secondary_command.to_be_bytes());
        out.push(self.encrypt_type);
        out.extend_from_slice(&self.body_len.to_be_bytes());
        out.push(self.padding);
    }

    /// Parse the first [`HEADER_LEN`] bytes. Caller has checked the length.
    fn read(buf: &[u8]) -> Result<Self, WireError> {
        if buf[0] != START_MARKER {
            return Err(WireError::BadMarker {
                which: "start",
                found: buf[0],
            });
        }
        let be16 = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);

        Ok(Self {
            major_version: be16(1),
            minor_version: be16(3),
            primary_command: be16(5),
            secondary_command: be16(7),
            encrypt_type: buf[9],
            body_len: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
            padding: buf[14],
        })
    }
}

/// Encodes station reports into wire messages and back
#[derive(Debug, Clone)]
pub struct WireCodec {
    cipher: Tea,
}

impl WireCodec {
    pub fn new(cipher: Tea) -> Self {
        Self { cipher }
    }

    pub fn encode(&self, report: &StationReport) -> Vec<u8> {
        let mut body = serialize_body(report);
        body.resize(BODY_LEN + PADDING, 0);
        self.cipher.encrypt_blocks(&mut body);

        let mut out = Vec::with_capacity(MESSAGE_LEN);
        WireHeader::default().write(&mut out);
        out.extend_from_slice(&body);

        let mut crc = Crc32::new();
        crc.update(&out);
        out.extend_from_slice(&crc.finish().to_be_bytes());
        out.push(END_MARKER);
        out
    }

    pub fn decode(&self, buf: &[u8]) -> Result<StationReport, WireError> {
        let (_, report) = self.decode_message(buf)?;
        Ok(report)
    }

    /// Verify and decrypt a message, returning its header and body
    pub fn decode_message(&self, buf: &[u8]) -> Result<(WireHeader, StationReport), WireError> {
        let min = HEADER_LEN + TRAILER_LEN;
        if buf.len() < min {
            return Err(WireError::Truncated {
                need: min,
                got: buf.len(),
            });
        }

        let header = WireHeader::read(buf)?;

        let end = buf[buf.len() - 1];
        if end != END_MARKER {
            return Err(WireError::BadMarker {
                which: "end",
                found: end,
            });
        }

        let crc_at = buf.len() - TRAILER_LEN;
        let expected = u32::from_be_bytes([buf[crc_at], buf[crc_at + 1], buf[crc_at + 2], buf[crc_at + 3]]);
        let mut crc = Crc32::new();
        crc.update(&buf[..crc_at]);
        let computed = crc.finish();
        if expected != computed {
            return Err(WireError::CrcMismatch { expected, computed });
        }

        let encrypted = &buf[HEADER_LEN..crc_at];
        let declared = header.body_len as usize;
        if declared != BODY_LEN
            || declared + header.padding as usize != encrypted.len()
            || encrypted.len() % BLOCK_SIZE != 0
        {
            return Err(WireError::BodyLength {
                declared: header.body_len,
                padding: header.padding,
                actual: encrypted.len(),
            });
        }

        let mut body = encrypted.to_vec();
        self.cipher.decrypt_blocks(&mut body);

        Ok((header, deserialize_body(&body[..BODY_LEN])))
    }
}

/// Encrypted datagram delivery, one wire message per event
pub struct WireDelivery {
    server: String,
    codec: WireCodec,
    prober: MacAddr,
    longitude: String,
    latitude: String,
    socket: Option<UdpSocket>,
}

impl WireDelivery {
    pub fn new(server: &str, codec: WireCodec, prober: MacAddr, longitude: &str, latitude: &str) -> Self {
        Self {
            server: server.to_string(),
            codec,
            prober,
            longitude: longitude.to_string(),
            latitude: latitude.to_string(),
            socket: None,
        }
    }
}

#[async_trait]
impl Delivery for WireDelivery {
    fn name(&self) -> &'static str {
        "wire"
    }

    fn target(&self) -> &str {
        &self.server
    }

    async fn connect(&mut self) -> Result<(), UplinkError> {
        let addr = tokio::net::lookup_host(self.server.as_str())
            .await?
            .next()
            .ok_or_else(|| UplinkError::Resolve(self.server.clone()))?;

        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(addr).await?;
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, event: &DeviceEvent) -> Result<(), UplinkError> {
        let socket = self.socket.as_ref().ok_or(UplinkError::NotConnected)?;
        let report = event.to_report(self.prober, &self.longitude, &self.latitude);
        let message = self.codec.encode(&report);
        let n = socket.send(&message).await?;
        debug!("Wrote {} bytes to {}", n, self.server);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.socket = None;
    }
}

fn serialize_body(report: &StationReport) -> Vec<u8> {
    let mut body = Vec::with_capacity(BODY_LEN + PADDING);
    put_text(&mut body, &report.timestamp, TIMESTAMP_LEN);
    body.extend_from_slice(report.station.as_bytes());
    body.extend_from_slice(report.prober.as_bytes());
    put_text(&mut body, &report.rssi, RSSI_LEN);
    put_text(&mut body, &report.longitude, COORD_LEN);
    put_text(&mut body, &report.latitude, COORD_LEN);
    body.resize(BODY_LEN, 0);
    body
}

fn deserialize_body(body: &[u8]) -> StationReport {
    let (timestamp, rest) = body.split_at(TIMESTAMP_LEN);
    let (station, rest) = rest.split_at(MAC_LEN);
    let (prober, rest) = rest.split_at(MAC_LEN);
    let (rssi, rest) = rest.split_at(RSSI_LEN);
    let (longitude, rest) = rest.split_at(COORD_LEN);
    let latitude = &rest[..COORD_LEN];

    StationReport {
        timestamp: get_text(timestamp),
        station: MacAddr::from_slice(station).unwrap_or_default(),
        prober: MacAddr::from_slice(prober).unwrap_or_default(),
        rssi: get_text(rssi),
        longitude: get_text(longitude),
        latitude: get_text(latitude),
    }
}

/// Write `text` NUL-padded (or truncated) to exactly `width` bytes
fn put_text(out: &mut Vec<u8>, text: &str, width: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

fn get_text(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uplink::cipher::DEFAULT_KEY;

    fn codec() -> WireCodec {
        WireCodec::new(Tea::new(&DEFAULT_KEY).unwrap())
    }

    fn report() -> StationReport {
        StationReport {
            timestamp: "2016-08-01 12:30:45".to_string(),
            station: MacAddr::new([0xC8, 0x5B, 0x76, 0x3B, 0x40, 0x1D]),
            prober: MacAddr::new([0x00, 0x0C, 0x43, 0xE1, 0x76, 0x2A]),
            rssi: "-50".to_string(),
            longitude: "111.111111".to_string(),
            latitude: "111.111111".to_string(),
        }
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(BODY_LEN, 136);
        assert_eq!(PADDING, 0);
        assert_eq!(MESSAGE_LEN, 156);
    }

    #[test]
    fn test_encode_layout() {
        let msg = codec().encode(&report());
        assert_eq!(msg.len(), MESSAGE_LEN);
        assert_eq!(msg[0], START_MARKER);
        assert_eq!(&msg[1..10], &[0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x01]);
        assert_eq!(&msg[10..14], &136u32.to_be_bytes());
        assert_eq!(msg[14], 0);
        assert_eq!(*msg.last().unwrap(), END_MARKER);

        // Body is encrypted: the plaintext timestamp must not appear
        let body = &msg[HEADER_LEN..HEADER_LEN + BODY_LEN];
        assert!(!body.windows(4).any(|w| w == b"2016"));
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        let sent = report();
        let (header, decoded) = codec.decode_message(&codec.encode(&sent)).unwrap();
        assert_eq!(decoded, sent);
        assert_eq!(header, WireHeader::default());
    }

    #[test]
    fn test_oversized_text_is_truncated() {
        let codec = codec();
        let mut long = report();
        long.longitude = "123.4567890123456".to_string();
        let decoded = codec.decode(&codec.encode(&long)).unwrap();
        assert_eq!(decoded.longitude, "123.45678901");
    }

    #[test]
    fn test_any_single_byte_corruption_fails() {
        let codec = codec();
        let msg = codec.encode(&report());

        for i in 0..msg.len() {
            for flip in [0x01u8, 0x80, 0xFF] {
                let mut bad = msg.clone();
                bad[i] ^= flip;
                assert!(codec.decode(&bad).is_err(), "corruption at byte {} undetected", i);
            }
        }
    }

    #[test]
    fn test_crc_mismatch_reported() {
        let codec = codec();
        let mut msg = codec.encode(&report());
        msg[HEADER_LEN + 3] ^= 0x10;
        assert!(matches!(codec.decode(&msg), Err(WireError::CrcMismatch { .. })));
    }

    #[test]
    fn test_truncated_and_markers() {
        let codec = codec();
        assert!(matches!(
            codec.decode(&[START_MARKER; 10]),
            Err(WireError::Truncated { need: 20, got: 10 })
        ));

        let mut msg = codec.encode(&report());
        msg[0] = 0x00;
        assert!(matches!(
            codec.decode(&msg),
            Err(WireError::BadMarker { which: "start", .. })
        ));

        let mut msg = codec.encode(&report());
        let last = msg.len() - 1;
        msg[last] = 0x00;
        assert!(matches!(
            codec.decode(&msg),
            Err(WireError::BadMarker { which: "end", .. })
        ));
    }

    #[test]
    fn test_short_body_with_valid_crc_rejected() {
        let codec = codec();
        let msg = codec.encode(&report());

        // Rebuild with a body one block short and a fresh CRC
        let mut cut = msg[..HEADER_LEN + BODY_LEN - BLOCK_SIZE].to_vec();
        let mut crc = Crc32::new();
        crc.update(&cut);
        cut.extend_from_slice(&crc.finish().to_be_bytes());
        cut.push(END_MARKER);

        assert!(matches!(codec.decode(&cut), Err(WireError::BodyLength { .. })));
    }

    #[tokio::test]
    async fn test_wire_delivery_sends_datagram() {
        use crate::models::Origin;

        let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = collector.local_addr().unwrap().to_string();

        let prober: MacAddr = "00:0c:43:e1:76:2a".parse().unwrap();
        let mut delivery = WireDelivery::new(&addr, codec(), prober, "111.111111", "111.111111");
        assert_eq!(delivery.target(), addr);
        delivery.connect().await.unwrap();

        let station = MacAddr::new([0x02, 0, 0, 0, 0, 7]);
        let event = DeviceEvent::join(station, Origin::Probe, -42, "X".into(), String::new());
        delivery.send(&event).await.unwrap();

        let mut buf = [0u8; 512];
        let n = collector.recv(&mut buf).await.unwrap();
        assert_eq!(n, MESSAGE_LEN);

        let report = codec().decode(&buf[..n]).unwrap();
        assert_eq!(report.station, station);
        assert_eq!(report.prober, prober);
        assert_eq!(report.rssi, "-42");
        assert_eq!(report.longitude, "111.111111");
    }

    #[tokio::test]
    async fn test_wire_delivery_unresolvable() {
        let mut delivery = WireDelivery::new("not a host", codec(), MacAddr::ZERO, "", "");
        assert!(delivery.connect().await.is_err());
        assert!(matches!(
            delivery.send(&crate::models::DeviceEvent::leave(MacAddr::ZERO, String::new())).await,
            Err(UplinkError::NotConnected)
        ));
    }

    #[test]
    fn test_wrong_key_garbles_body() {
        let msg = codec().encode(&report());
        let other = WireCodec::new(Tea::new(&[0x11; 16]).unwrap());
        let decoded = other.decode(&msg).unwrap();
        assert_ne!(decoded, report());
    }
}

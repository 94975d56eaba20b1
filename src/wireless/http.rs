//! Plaintext HTTP sniffing inside QoS data frames
//!
//! Walks LLC/SNAP -> IPv4 -> TCP -> HTTP request header and pulls out the
//! `User-Agent:` line. Every layer is bounds checked against the buffer it
//! was handed; any mismatch yields `None`.

/// Bytes between the frame-control byte and the LLC/SNAP header of a QoS data frame
pub const QOS_HEADER_LEN: usize = 26;
/// LLC/SNAP header length
pub const LLC_SNAP_LEN: usize = 8;
/// IPv4 header length (no options accepted)
pub const IPV4_HEADER_LEN: usize = 20;
/// Assumed TCP header length (20 bytes + 12 bytes of timestamp options)
pub const TCP_HEADER_LEN: usize = 32;

/// IP payload length bounds (exclusive) for a capture to be worth reading
pub const MIN_IP_PAYLOAD: usize = 64;
pub const MAX_IP_PAYLOAD: usize = 1024;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_TCP: u8 = 6;

/// LLC/SNAP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlcSnapHeader {
    /// OUI (usually 00:00:00 for Ethernet)
    pub oui: [u8; 3],
    /// EtherType
    pub ethertype: u16,
}

impl LlcSnapHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let hdr = data.get(..LLC_SNAP_LEN)?;

        // DSAP/SSAP both 0xAA for SNAP
        if hdr[0] != 0xaa || hdr[1] != 0xaa {
            return None;
        }

        Some(LlcSnapHeader {
            oui: [hdr[3], hdr[4], hdr[5]],
            ethertype: u16::from_be_bytes([hdr[6], hdr[7]]),
        })
    }
}

/// The parts of an IPv4 header the sniffer cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Summary {
    pub protocol: u8,
    pub total_length: usize,
}

impl Ipv4Summary {
    /// Parse a 20-byte IPv4 header. Options (IHL != 5) are rejected.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let hdr = data.get(..IPV4_HEADER_LEN)?;
        if hdr[0] != 0x45 {
            return None;
        }

        Some(Ipv4Summary {
            protocol: hdr[9],
            total_length: u16::from_be_bytes([hdr[2], hdr[3]]) as usize,
        })
    }

    /// Length of everything after the IPv4 header, per the header itself
    pub fn payload_len(&self) -> usize {
        self.total_length.saturating_sub(IPV4_HEADER_LEN)
    }
}

/// Extract the `User-Agent:` line from the LLC/SNAP-onward part of a QoS data frame.
pub fn sniff_user_agent(llc: &[u8]) -> Option<String> {
    let snap = LlcSnapHeader::parse(llc)?;
    if snap.ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = llc.get(LLC_SNAP_LEN..)?;
    let ipv4 = Ipv4Summary::parse(ip)?;
    if ipv4.protocol != IPPROTO_TCP {
        return None;
    }

    let payload_len = ipv4.payload_len();
    if payload_len <= MIN_IP_PAYLOAD || payload_len >= MAX_IP_PAYLOAD {
        return None;
    }

    // The datagram may be shorter in the buffer than its header claims
    let datagram_end = ipv4.total_length.min(ip.len());
    let http_start = IPV4_HEADER_LEN + TCP_HEADER_LEN;
    let http = ip.get(http_start..datagram_end)?;

    if !http.starts_with(b"GET") {
        return None;
    }

    find_user_agent(http)
}

/// Scan an HTTP header block (CRLF separated) for the User-Agent line.
pub fn find_user_agent(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);

    for line in text.split("\r\n") {
        if line.is_empty() {
            break;
        }
        let is_ua = line
            .get(..11)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("user-agent:"));
        if is_ua {
            return Some(line.to_string());
        }
    }

    None
}

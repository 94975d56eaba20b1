use thiserror::Error;

/// Cipher construction errors. Fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("tea: incorrect key size: expected 16 bytes, got {0}")]
    KeySize(usize),

    #[error("tea: invalid round count {0}: must be even and non-zero")]
    Rounds(u32),

    #[error("tea: key is not valid hex: {0}")]
    KeyHex(String),
}

/// Wire message decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("wire message truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("bad {which} marker: 0x{found:02x}")]
    BadMarker { which: &'static str, found: u8 },

    #[error("crc mismatch: expected 0x{expected:08x}, computed 0x{computed:08x}")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("body length mismatch: header says {declared} (+{padding} padding), body has {actual}")]
    BodyLength {
        declared: u32,
        padding: u8,
        actual: usize,
    },
}

/// Frame source errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pcap error: {0}")]
    Pcap(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame source closed")]
    Closed,
}

/// Uplink delivery errors.
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {0} timed out")]
    Timeout(String),

    #[error("no address resolved for {0}")]
    Resolve(String),

    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,
}

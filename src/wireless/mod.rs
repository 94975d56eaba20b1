//! 802.11 capture and classification
//!
//! Frames come from a monitor mode interface (or the driver's station proc
//! file) and are classified into sightings:
//! - Probe requests (client looking for networks)
//! - Beacons (access points announcing themselves)
//! - Plaintext HTTP GETs in QoS data frames (User-Agent sniffing)

pub mod capture;
pub mod classifier;
pub mod frame;
pub mod http;

pub use capture::{
    FrameSource, PcapSettings, PcapSource, ProcFeed, ReplaySource, SourceKind, StationSighting,
};
pub use classifier::{classify, ClassifiedFrame, ClassifierConfig};
pub use frame::MacAddr;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::wireless::MacAddr;

/// Presence transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Join,
    Refresh,
    Leave,
}

impl EventKind {
    /// Numeric action code understood by the collector
    pub fn action_code(&self) -> u8 {
        match self {
            EventKind::Refresh => 0,
            EventKind::Join => 1,
            EventKind::Leave => 2,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Join => write!(f, "join"),
            EventKind::Refresh => write!(f, "refresh"),
            EventKind::Leave => write!(f, "leave"),
        }
    }
}

/// What produced a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Probe,
    Beacon,
    Proc,
    Leave,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Probe => "probe",
            Origin::Beacon => "beacon",
            Origin::Proc => "proc",
            Origin::Leave => "leave",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probe" => Ok(Origin::Probe),
            "beacon" => Ok(Origin::Beacon),
            "proc" => Ok(Origin::Proc),
            "leave" => Ok(Origin::Leave),
            _ => Err(format!("Unknown origin: {}", s)),
        }
    }
}

/// A presence transition for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub mac: MacAddr,
    pub kind: EventKind,
    pub origin: Origin,
    /// dBm, 0 when unknown
    pub rssi: i32,
    pub ssid: String,
    pub model: String,
    pub observed_at: DateTime<Utc>,
}

impl DeviceEvent {
    pub fn join(mac: MacAddr, origin: Origin, rssi: i32, ssid: String, model: String) -> Self {
        Self {
            mac,
            kind: EventKind::Join,
            origin,
            rssi,
            ssid,
            model,
            observed_at: Utc::now(),
        }
    }

    pub fn leave(mac: MacAddr, model: String) -> Self {
        Self {
            mac,
            kind: EventKind::Leave,
            origin: Origin::Leave,
            rssi: 0,
            ssid: String::new(),
            model,
            observed_at: Utc::now(),
        }
    }

    /// Flat record for the structured uplink
    pub fn to_record(&self, node_id: &str) -> StationRecord {
        StationRecord {
            node_id: node_id.to_string(),
            mac_addr: self.mac.to_string(),
            from: self.origin.to_string(),
            model: self.model.clone(),
            rssi: self.rssi,
            ssid: self.ssid.clone(),
            action: self.kind.action_code(),
        }
    }

    /// Body for the encrypted uplink
    pub fn to_report(&self, prober: MacAddr, longitude: &str, latitude: &str) -> StationReport {
        StationReport {
            timestamp: self
                .observed_at
                .with_timezone(&Local)
                .format(StationReport::TIME_FORMAT)
                .to_string(),
            station: self.mac,
            prober,
            rssi: self.rssi.to_string(),
            longitude: longitude.to_string(),
            latitude: latitude.to_string(),
        }
    }
}

/// Structured record streamed to the collector, one JSON object per line.
/// Field order is part of the collector contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub node_id: String,
    pub mac_addr: String,
    pub from: String,
    pub model: String,
    pub rssi: i32,
    pub ssid: String,
    pub action: u8,
}

/// Plaintext body of a wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationReport {
    pub timestamp: String,
    pub station: MacAddr,
    pub prober: MacAddr,
    pub rssi: String,
    pub longitude: String,
    pub latitude: String,
}

impl StationReport {
    pub const TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        MacAddr::new([0xC8, 0x5B, 0x76, 0x3B, 0x40, 0x1D])
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(EventKind::Refresh.action_code(), 0);
        assert_eq!(EventKind::Join.action_code(), 1);
        assert_eq!(EventKind::Leave.action_code(), 2);
    }

    #[test]
    fn test_leave_event_fields() {
        let event = DeviceEvent::leave(mac(), "ZTE".to_string());
        assert_eq!(event.kind, EventKind::Leave);
        assert_eq!(event.origin, Origin::Leave);
        assert_eq!(event.rssi, 0);
        assert!(event.ssid.is_empty());
        assert_eq!(event.model, "ZTE");
    }

    #[test]
    fn test_record_field_order() {
        let event = DeviceEvent::join(mac(), Origin::Probe, -50, "TEST".into(), String::new());
        let json = serde_json::to_string(&event.to_record("00:0c:43:e1:76:2a")).unwrap();
        assert_eq!(
            json,
            r#"{"node_id":"00:0c:43:e1:76:2a","mac_addr":"C8:5B:76:3B:40:1D","from":"probe","model":"","rssi":-50,"ssid":"TEST","action":1}"#
        );
    }

    #[test]
    fn test_report_fields() {
        let event = DeviceEvent::join(mac(), Origin::Proc, -71, String::new(), String::new());
        let report = event.to_report(MacAddr::ZERO, "111.111111", "22.5");
        assert_eq!(report.rssi, "-71");
        assert_eq!(report.station, mac());
        assert_eq!(report.latitude, "22.5");
        assert_eq!(report.timestamp.len(), 19);
    }

    #[test]
    fn test_origin_roundtrip_str() {
        for origin in [Origin::Probe, Origin::Beacon, Origin::Proc, Origin::Leave] {
            assert_eq!(origin.as_str().parse::<Origin>().unwrap(), origin);
        }
        assert!("radar".parse::<Origin>().is_err());
    }
}

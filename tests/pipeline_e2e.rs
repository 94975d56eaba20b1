//! Capture -> presence -> pipeline -> uplink against local collectors

mod common;

use std::collections::HashSet;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

use wifiprobe::models::StationRecord;
use wifiprobe::uplink::cipher::DEFAULT_KEY;
use wifiprobe::uplink::{Tea, UplinkMode, UplinkState, WireCodec};
use wifiprobe::wireless::{MacAddr, ReplaySource};
use wifiprobe::{Agent, Input};

use common::*;

/// Accept one connection and forward every record line
async fn record_collector(listener: TcpListener) -> mpsc::UnboundedReceiver<StationRecord> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let record: StationRecord = serde_json::from_str(&line).unwrap();
            if tx.send(record).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_record(rx: &mut mpsc::UnboundedReceiver<StationRecord>) -> StationRecord {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("collector timed out")
        .expect("collector closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_probe_storm_yields_one_join_per_station() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let mut records = record_collector(listener).await;

    const STATIONS: u8 = 7;
    let frames = probe_storm(STATIONS, 20);
    let total_frames = frames.len() as u64;

    let mut agent = Agent::new(agent_config(&addr, UplinkMode::Record)).unwrap();
    agent
        .start(Input::Frames(Box::new(ReplaySource::new(frames))))
        .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..STATIONS {
        let record = next_record(&mut records).await;
        assert_eq!(record.action, 1);
        assert_eq!(record.from, "probe");
        assert_eq!(record.node_id, "00:0c:43:e1:76:2a");
        assert_eq!(record.ssid, "Guest");
        assert!(seen.insert(record.mac_addr));
    }

    // Nothing idles past the TTL, so nothing else arrives
    assert!(
        tokio::time::timeout(Duration::from_millis(300), records.recv())
            .await
            .is_err()
    );

    let stats = agent.processor().stats();
    assert_eq!(stats.frames_seen, total_frames);
    assert_eq!(stats.joins, STATIONS as u64);
    assert_eq!(stats.leaves, 0);
    assert_eq!(agent.pipeline().stats().enqueued, STATIONS as u64);
    assert_eq!(agent.uplink().stats().sent, STATIONS as u64);
    assert_eq!(agent.uplink().state(), UplinkState::Connected);

    agent.stop().await;
    assert_eq!(agent.uplink().state(), UplinkState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wire_datagrams_decode() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap().to_string();

    let mut agent = Agent::new(agent_config(&addr, UplinkMode::Wire)).unwrap();
    agent
        .start(Input::Frames(Box::new(ReplaySource::new(probe_storm(3, 5)))))
        .unwrap();

    let codec = WireCodec::new(Tea::new(&DEFAULT_KEY).unwrap());
    let prober: MacAddr = "00:0c:43:e1:76:2a".parse().unwrap();
    let mut stations = HashSet::new();
    let mut buf = [0u8; 1500];

    for _ in 0..3 {
        let n = tokio::time::timeout(WAIT, collector.recv(&mut buf))
            .await
            .expect("no datagram")
            .unwrap();
        let report = codec.decode(&buf[..n]).unwrap();
        assert_eq!(report.prober, prober);
        assert_eq!(report.longitude, "111.111111");
        assert_eq!(report.timestamp.len(), 19);
        assert!(report.rssi.starts_with('-'));
        stations.insert(report.station);
    }

    let expected: HashSet<MacAddr> = (0..3).map(|i| MacAddr::new(station(i))).collect();
    assert_eq!(stations, expected);

    agent.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_station_leaves_with_model() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let mut records = record_collector(listener).await;

    let mut config = agent_config(&addr, UplinkMode::Record);
    config.capture.http_sniff = true;
    config.presence.ttl_secs = 1;
    config.presence.sweep_interval_secs = 1;

    let phone = station(0x42);
    let frames = vec![
        http_get(phone, "Mozilla/5.0 (Linux; U; Android 6.0; HUAWEI NXT-AL10)"),
        probe_request(phone, "", 190),
    ];

    let mut agent = Agent::new(config).unwrap();
    agent
        .start(Input::Frames(Box::new(ReplaySource::new(frames))))
        .unwrap();

    let join = next_record(&mut records).await;
    assert_eq!(join.action, 1);
    assert_eq!(join.model, "HuaWei");
    assert_eq!(join.mac_addr, MacAddr::new(phone).to_string());

    let leave = next_record(&mut records).await;
    assert_eq!(leave.action, 2);
    assert_eq!(leave.from, "leave");
    assert_eq!(leave.rssi, 0);
    assert_eq!(leave.model, "HuaWei");
    assert_eq!(leave.mac_addr, join.mac_addr);

    agent.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_uplink_waits_for_collector() {
    // Reserve a port with nothing listening on it
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().port()
    };
    let addr = format!("127.0.0.1:{}", port);

    let mut agent = Agent::new(agent_config(&addr, UplinkMode::Record)).unwrap();
    agent
        .start(Input::Frames(Box::new(ReplaySource::new(vec![probe_request(
            station(1),
            "Late",
            200,
        )]))))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ne!(agent.uplink().state(), UplinkState::Connected);
    assert!(agent.uplink().stats().connect_failures >= 1);

    // Join stays queued until the collector shows up
    let listener = TcpListener::bind(&addr).await.unwrap();
    let mut records = record_collector(listener).await;

    let record = next_record(&mut records).await;
    assert_eq!(record.ssid, "Late");
    assert_eq!(agent.uplink().stats().failed, 0);

    agent.stop().await;
}

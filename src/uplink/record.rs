//! Structured record delivery
//!
//! Streams one JSON object per line over a persistent TCP connection.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::UplinkError;
use crate::models::DeviceEvent;

use super::Delivery;

pub struct RecordDelivery {
    server: String,
    node_id: String,
    connect_timeout: Duration,
    send_timeout: Duration,
    stream: Option<TcpStream>,
}

impl RecordDelivery {
    pub fn new(server: &str, node_id: &str, connect_timeout: Duration) -> Self {
        Self {
            server: server.to_string(),
            node_id: node_id.to_string(),
            connect_timeout,
            send_timeout: connect_timeout,
            stream: None,
        }
    }

    /// Bound on writing one record; a collector that stops reading fails the send
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Serialized line for one event, newline included
    pub fn encode_line(&self, event: &DeviceEvent) -> Result<Vec<u8>, UplinkError> {
        let mut line = serde_json::to_vec(&event.to_record(&self.node_id))?;
        line.push(b'\n');
        Ok(line)
    }
}

#[async_trait]
impl Delivery for RecordDelivery {
    fn name(&self) -> &'static str {
        "record"
    }

    fn target(&self) -> &str {
        &self.server
    }

    async fn connect(&mut self) -> Result<(), UplinkError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.server))
            .await
            .map_err(|_| UplinkError::Timeout(self.server.clone()))??;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, event: &DeviceEvent) -> Result<(), UplinkError> {
        let line = self.encode_line(event)?;
        let stream = self.stream.as_mut().ok_or(UplinkError::NotConnected)?;
        tokio::time::timeout(self.send_timeout, stream.write_all(&line))
            .await
            .map_err(|_| UplinkError::Timeout(self.server.clone()))??;
        debug!("Sent {} byte record for {}", line.len(), event.mac);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

//! # Snapshot Publishing
//!
//! When the session decides a reading is worth reporting it hands a
//! [`Snapshot`] to a [`Publisher`]. The crate ships a log-based publisher,
//! a JSON-lines publisher for any `Write` sink and an in-memory one.

use crate::error::IecError;
use crate::iec::session::SessionStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Why a snapshot was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    /// Nothing was published for the heartbeat interval.
    Heartbeat,
    /// High power draw or feed-in, reported more often.
    HighPower,
    /// Power moved outside the hysteresis band.
    SignificantChange,
}

/// Session health data reported with each snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub uptime_s: u64,
    pub pulse_min: Option<u16>,
    pub pulse_max: Option<u16>,
    pub stats: SessionStats,
}

/// One published reading.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Identification string of the meter, empty before the first handshake.
    pub device: String,
    pub positive_wh: u64,
    pub negative_wh: u64,
    /// Net power, positive when importing.
    pub power_watt: i32,
    pub reason: PublishReason,
    pub diagnostics: Diagnostics,
}

/// Destination for snapshots.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), IecError>;

    /// Called once per main-loop iteration so slow links can stay connected.
    async fn keep_alive(&mut self) -> Result<(), IecError> {
        Ok(())
    }
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Box<P> {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), IecError> {
        (**self).publish(snapshot).await
    }

    async fn keep_alive(&mut self) -> Result<(), IecError> {
        (**self).keep_alive().await
    }
}

/// Writes snapshots to the log at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&mut self, s: &Snapshot) -> Result<(), IecError> {
        info!(
            "{} +{} Wh -{} Wh {} W ({:?})",
            s.device, s.positive_wh, s.negative_wh, s.power_watt, s.reason
        );
        Ok(())
    }
}

/// Writes one JSON document per line.
pub struct JsonLinePublisher<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinePublisher<W> {
    pub fn new(writer: W) -> Self {
        JsonLinePublisher { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonLinePublisher<W> {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), IecError> {
        serde_json::to_writer(&mut self.writer, snapshot)
            .map_err(|e| IecError::PublishError(e.to_string()))?;
        writeln!(self.writer).map_err(|e| IecError::PublishError(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| IecError::PublishError(e.to_string()))
    }
}

/// Keeps every snapshot in memory. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), IecError> {
        self.snapshots
            .lock()
            .map_err(|_| IecError::PublishError("snapshot list poisoned".into()))?
            .push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            device: "ISK5ME162-0001".into(),
            positive_wh: 32_826_545,
            negative_wh: 1,
            power_watt: -420,
            reason: PublishReason::SignificantChange,
            diagnostics: Diagnostics {
                uptime_s: 61,
                pulse_min: None,
                pulse_max: None,
                stats: SessionStats::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_json_line_publisher() {
        let mut publisher = JsonLinePublisher::new(Vec::new());
        publisher.publish(&snapshot()).await.unwrap();
        publisher.publish(&snapshot()).await.unwrap();

        let out = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let doc: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(doc["positive_wh"], 32_826_545);
        assert_eq!(doc["power_watt"], -420);
        assert_eq!(doc["reason"], "significant_change");
    }

    #[tokio::test]
    async fn test_memory_publisher_shared() {
        let publisher = MemoryPublisher::new();
        let mut handle = publisher.clone();
        handle.publish(&snapshot()).await.unwrap();
        assert_eq!(publisher.snapshots().len(), 1);
        assert!(handle.keep_alive().await.is_ok());
    }
}

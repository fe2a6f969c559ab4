//! Adapter exposing a [`Master`] as an `agent-core` [`Driver`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use agent_core::drivers::{Driver, Reading, SensorType};
use async_trait::async_trait;

use crate::config::Dnp3Config;
use crate::master::Master;

/// Maps one polled DNP3 point to a `Reading`'s sensor type, unit, and scale.
#[derive(Debug, Clone)]
pub struct PointMapping {
    pub group: u8,
    pub index: u32,
    pub sensor_type: SensorType,
    pub unit: String,
    pub scale: f64,
}

impl PointMapping {
    pub fn new(group: u8, index: u32, sensor_type: SensorType, unit: impl Into<String>, scale: f64) -> Self {
        PointMapping {
            group,
            index,
            sensor_type,
            unit: unit.into(),
            scale,
        }
    }
}

/// Drives a DNP3 outstation by running an integrity poll per `read_all`
/// call and projecting the mapped points into `Reading`s.
pub struct Dnp3Driver {
    id: String,
    master: Master,
    mappings: Vec<PointMapping>,
}

impl Dnp3Driver {
    pub fn new(id: String, config: Dnp3Config, mappings: Vec<PointMapping>) -> anyhow::Result<Self> {
        Ok(Dnp3Driver {
            id,
            master: Master::new(config)?,
            mappings,
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn with_stream(
        id: String,
        config: Dnp3Config,
        mappings: Vec<PointMapping>,
        stream: Box<dyn crate::byte_stream::ByteStream>,
    ) -> anyhow::Result<Self> {
        Ok(Dnp3Driver {
            id,
            master: Master::with_stream(config, stream)?,
            mappings,
        })
    }

    fn timestamp_ms() -> anyhow::Result<u64> {
        Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
    }
}

#[async_trait]
impl Driver for Dnp3Driver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        self.master.open().await?;
        Ok(())
    }

    async fn read_all(&mut self) -> anyhow::Result<Vec<Reading>> {
        let poll = self.master.integrity_poll().await;
        if !poll.success {
            return Err(anyhow::anyhow!(poll.error.unwrap_or_else(|| "integrity poll failed".to_string())));
        }

        let timestamp_ms = Self::timestamp_ms()?;
        let mut readings = Vec::with_capacity(self.mappings.len());

        for mapping in &self.mappings {
            let raw_value = match mapping.group {
                1 | 2 => poll.binary_inputs.iter().find(|p| p.index == mapping.index).map(|p| p.value as u8 as f64),
                20 | 21 | 22 => poll.counters.iter().find(|p| p.index == mapping.index).map(|p| p.value as f64),
                30 | 31 | 32 => poll.analog_inputs.iter().find(|p| p.index == mapping.index).map(|p| p.value),
                40 | 41 | 42 => poll.analog_outputs.iter().find(|p| p.index == mapping.index).map(|p| p.value),
                other => {
                    tracing::warn!(group = other, index = mapping.index, "unsupported point-mapping group, skipping");
                    None
                }
            };

            let raw_value = match raw_value {
                Some(v) => v,
                None => continue,
            };

            let mut metadata = HashMap::new();
            metadata.insert("group".to_string(), mapping.group.to_string());
            metadata.insert("index".to_string(), mapping.index.to_string());

            readings.push(Reading {
                sensor_type: mapping.sensor_type,
                unit: mapping.unit.clone(),
                value: raw_value * mapping.scale,
                timestamp_ms,
                metadata,
            });
        }

        Ok(readings)
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.master.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_stream::mock::DuplexByteStream;
    use crate::datalink::DataLinkLayer;
    use crate::transport::{TransportLayer, MAX_SEGMENT_PAYLOAD};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config() -> Dnp3Config {
        let mut cfg = Dnp3Config::default();
        cfg.confirm_required = false;
        cfg.response_timeout = std::time::Duration::from_millis(500);
        cfg
    }

    #[tokio::test]
    async fn read_all_projects_matching_points_into_readings() {
        let (stream, mut outstation) = DuplexByteStream::pair(4096);
        let mappings = vec![PointMapping::new(30, 0, SensorType::Power, "W", 1.0)];
        let mut driver = Dnp3Driver {
            id: "dnp3-1".to_string(),
            master: Master::with_stream(test_config(), Box::new(stream)).unwrap(),
            mappings,
        };

        let outstation_task = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            outstation.read(&mut buf).await.unwrap();

            // Group 30 Var 1 (flags + i32), index 0, value 1000.
            let mut apdu = vec![0xC4, 0x81, 0x00, 0x00, 30, 1, 0x00, 0x00, 0x00];
            apdu.push(crate::objects::analog::AnalogFlags::ONLINE.bits());
            apdu.extend_from_slice(&1000i32.to_le_bytes());

            let mut dll = DataLinkLayer::new(10, 1).unwrap();
            dll.toggle_fcb();
            let dll = dll;
            let mut tf = TransportLayer::new();
            for segment in &tf.segment(&apdu, MAX_SEGMENT_PAYLOAD) {
                let frame = dll.build_frame(segment, false, false).unwrap();
                outstation.write_all(&frame).await.unwrap();
            }
        });

        let readings = driver.read_all().await.unwrap();
        outstation_task.await.unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, 1000.0);
        assert_eq!(readings[0].unit, "W");
    }

    #[tokio::test]
    async fn read_all_skips_unmapped_points() {
        let (stream, mut outstation) = DuplexByteStream::pair(4096);
        let mappings = vec![PointMapping::new(30, 99, SensorType::Power, "W", 1.0)];
        let mut driver = Dnp3Driver {
            id: "dnp3-1".to_string(),
            master: Master::with_stream(test_config(), Box::new(stream)).unwrap(),
            mappings,
        };

        let outstation_task = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            outstation.read(&mut buf).await.unwrap();
            let apdu = vec![0xC4, 0x81, 0x00, 0x00];
            let dll = DataLinkLayer::new(10, 1).unwrap();
            let mut tf = TransportLayer::new();
            for segment in &tf.segment(&apdu, MAX_SEGMENT_PAYLOAD) {
                let frame = dll.build_frame(segment, false, false).unwrap();
                outstation.write_all(&frame).await.unwrap();
            }
        });

        let readings = driver.read_all().await.unwrap();
        outstation_task.await.unwrap();
        assert!(readings.is_empty());
    }
}

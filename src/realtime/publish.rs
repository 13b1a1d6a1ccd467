//! Outbound publish pipeline
//!
//! serialize → compress → compress the topic name → hand to the transport.

use super::codec;
use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::{Command, TopicRegistry};
use crate::transport::Transport;
use rumqttc::QoS;
use std::sync::Arc;
use tracing::debug;

/// A publish ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub wire_topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

#[derive(Debug, Clone)]
pub struct PublishPipeline {
    topics: Arc<TopicRegistry>,
}

impl PublishPipeline {
    pub fn new(topics: Arc<TopicRegistry>) -> Self {
        Self { topics }
    }

    /// Compress and address raw payload bytes (pure function)
    pub fn encode(&self, topic: &str, payload: &[u8], qos: QoS) -> RealtimeResult<OutboundFrame> {
        let compressed = codec::compress(payload).map_err(RealtimeError::Compression)?;
        Ok(OutboundFrame {
            wire_topic: self.topics.map_to_wire_id(topic),
            payload: compressed,
            qos,
        })
    }

    pub fn encode_command(&self, command: &dyn Command) -> RealtimeResult<OutboundFrame> {
        let payload = command.serialized_payload()?;
        self.encode(command.topic(), &payload, command.qos())
    }

    /// Encode a command and forward it; the broker ack is not awaited
    pub async fn publish<T>(&self, transport: &mut T, command: &dyn Command) -> RealtimeResult<()>
    where
        T: Transport + ?Sized,
    {
        let frame = self.encode_command(command)?;
        debug!(
            topic = %command.topic(),
            wire_topic = %frame.wire_topic,
            bytes = frame.payload.len(),
            "Publishing command"
        );
        transport
            .publish(&frame.wire_topic, frame.payload, frame.qos)
            .await?;
        Ok(())
    }
}

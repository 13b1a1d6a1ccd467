//! Transport adapter boundary
//!
//! The lifecycle manager talks to the MQTT engine only through the
//! [`Transport`] trait, and hears back from it only through a stream of
//! [`TransportEvent`]s. This keeps the state machine testable against a mock
//! transport and lets the engine be swapped without touching the core.

use bytes::Bytes;
use rumqttc::QoS;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Broker host and port, plus whether the socket is wrapped in TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Everything needed to open one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub endpoint: BrokerEndpoint,
    pub client_id: String,
    /// Serialized handshake presented to the broker
    pub handshake: String,
    pub timeout: Duration,
}

/// Lifecycle and traffic events surfaced by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Dial started
    Opened,
    /// Broker accepted the session
    Connected,
    /// Session ended, for any reason
    Closed { reason: Option<String> },
    /// Inbound publish, topic is the wire id and payload is still compressed
    Message { topic: String, payload: Bytes },
    PingCompleted,
    PublishCompleted,
    Warning(String),
    Error(String),
}

/// Sender half handed to transports for emitting events
pub type EventSender = tokio::sync::mpsc::UnboundedSender<TransportEvent>;
/// Receiver half consumed by the client event loop
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<TransportEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected")]
    NotConnected,
}

/// Capability interface over the MQTT engine
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Start opening a session; completion is reported as an event
    async fn connect(&mut self, params: ConnectParams) -> Result<(), TransportError>;

    /// Publish bytes to a wire topic; the ack is reported as an event
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: QoS)
        -> Result<(), TransportError>;

    /// Tear the session down; a `Closed` event follows
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

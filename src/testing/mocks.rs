//! Mock implementations for testing
//!
//! Provides a mock Transport plus recording Parser and Handler
//! implementations so the lifecycle and dispatch paths can be exercised
//! without a broker.

use crate::realtime::dispatch::{DecodedMessage, Handler, HandlerError, ParseError, Parser};
use crate::transport::{ConnectParams, EventSender, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A publish captured by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Mock transport for testing
///
/// Clones share their recorded history, so a test can keep one clone while
/// the client owns another. With [`MockTransport::with_events`] the mock
/// answers `connect` with `Opened` + `Connected` and `disconnect` with
/// `Closed` like a cooperative broker; without it the test feeds events by
/// hand.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    connects: Arc<Mutex<Vec<ConnectParams>>>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    disconnects: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
    fail_connect: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
    events: Option<EventSender>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect and publish fails
    pub fn with_failure() -> Self {
        let transport = Self::default();
        transport.set_connect_failure(true);
        transport.set_publish_failure(true);
        transport
    }

    /// Emit lifecycle events on `events` as a real transport would
    pub fn with_events(events: EventSender) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn get_connects(&self) -> Vec<ConnectParams> {
        self.connects.lock().await.clone()
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub async fn clear_history(&self) {
        self.connects.lock().await.clear();
        self.published.lock().await.clear();
        self.disconnects.store(0, Ordering::SeqCst);
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, params: ConnectParams) -> Result<(), TransportError> {
        self.connects.lock().await.push(params);

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "mock connect failure".into(),
            ));
        }

        if self.events.is_some() {
            self.emit(TransportEvent::Opened);
            self.set_connected(true);
            self.emit(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed("mock publish failure".into()));
        }

        self.published.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            self.emit(TransportEvent::Closed {
                reason: Some("client disconnect".to_string()),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Parser returning a fixed list of messages, or an error
#[derive(Debug, Clone)]
pub struct MockParser {
    messages: Vec<DecodedMessage>,
    should_fail: bool,
}

impl MockParser {
    pub fn new(messages: Vec<DecodedMessage>) -> Self {
        Self {
            messages,
            should_fail: false,
        }
    }

    pub fn with_failure() -> Self {
        Self {
            messages: Vec::new(),
            should_fail: true,
        }
    }
}

impl Parser for MockParser {
    fn parse(&self, _topic: &str, _payload: &[u8]) -> Result<Vec<DecodedMessage>, ParseError> {
        if self.should_fail {
            return Err(ParseError::Malformed("mock parse failure".to_string()));
        }
        Ok(self.messages.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum HandlerMode {
    #[default]
    Succeed,
    Recoverable,
    Unexpected,
}

/// Handler recording every message it is given
#[derive(Debug, Default)]
pub struct MockHandler {
    handled: std::sync::Mutex<Vec<DecodedMessage>>,
    mode: HandlerMode,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_recoverable() -> Self {
        Self {
            mode: HandlerMode::Recoverable,
            ..Default::default()
        }
    }

    pub fn failing_unexpected() -> Self {
        Self {
            mode: HandlerMode::Unexpected,
            ..Default::default()
        }
    }

    /// Messages seen so far, including the ones that failed
    pub fn handled(&self) -> Vec<DecodedMessage> {
        self.handled
            .lock()
            .map(|handled| handled.clone())
            .unwrap_or_default()
    }
}

impl Handler for MockHandler {
    fn handle(&self, message: &DecodedMessage) -> Result<(), HandlerError> {
        if let Ok(mut handled) = self.handled.lock() {
            handled.push(message.clone());
        }
        match self.mode {
            HandlerMode::Succeed => Ok(()),
            HandlerMode::Recoverable => Err(HandlerError::recoverable("mock recoverable failure")),
            HandlerMode::Unexpected => Err(HandlerError::unexpected("mock unexpected failure")),
        }
    }
}

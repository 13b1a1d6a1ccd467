//! Inbound dispatch pipeline
//!
//! decompress → expand the wire topic → parse → route each decoded message to
//! the handler registered for its module.
//!
//! Failures are contained at the smallest possible scope. A bad envelope is
//! dropped without affecting the next one, a missing handler or a recoverable
//! handler error only skips that message, and an unexpected handler error is
//! escalated to the application as a [`ClientEvent::Warning`] while the
//! remaining messages keep flowing.

use super::codec;
use super::ClientEvent;
use crate::error::sanitize_error_message;
use crate::protocol::TopicRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// One logical message produced by a parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Logical category used to pick the handler
    pub module: String,
    pub data: Value,
}

impl DecodedMessage {
    pub fn new(module: impl Into<String>, data: Value) -> Self {
        Self {
            module: module.into(),
            data,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Anticipated edge case; logged and swallowed
    #[error("{0}")]
    Recoverable(String),
    /// Anything else; escalated to the application
    #[error("Unexpected handler failure: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into().into())
    }
}

/// Turns a decompressed payload into zero or more messages
pub trait Parser: Send + Sync {
    fn parse(&self, topic: &str, payload: &[u8]) -> Result<Vec<DecodedMessage>, ParseError>;
}

/// Consumes decoded messages of one module
pub trait Handler: Send + Sync {
    fn handle(&self, message: &DecodedMessage) -> Result<(), HandlerError>;
}

/// Parses a JSON payload into a single message for a fixed module
#[derive(Debug, Clone)]
pub struct JsonParser {
    module: String,
}

impl JsonParser {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
        }
    }
}

impl Parser for JsonParser {
    fn parse(&self, _topic: &str, payload: &[u8]) -> Result<Vec<DecodedMessage>, ParseError> {
        let data: Value = serde_json::from_slice(payload)?;
        Ok(vec![DecodedMessage::new(self.module.clone(), data)])
    }
}

/// Topic name → parser
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, topic: impl Into<String>, parser: Arc<dyn Parser>) -> Self {
        self.parsers.insert(topic.into(), parser);
        self
    }

    pub fn get(&self, topic: &str) -> Option<&Arc<dyn Parser>> {
        self.parsers.get(topic)
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

/// Module name → handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(module.into(), handler);
        self
    }

    pub fn get(&self, module: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(module)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Decompression,
    NoParser,
    ParseFailed,
}

/// Per-envelope message accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub handled: usize,
    /// No handler registered for the module
    pub skipped: usize,
    /// Handler reported a recoverable error
    pub recovered: usize,
    /// Handler failed unexpectedly, warning emitted
    pub escalated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dropped { topic: String, reason: DropReason },
    Delivered(DeliveryReport),
}

pub struct InboundDispatcher {
    topics: Arc<TopicRegistry>,
    parsers: ParserRegistry,
    handlers: HandlerRegistry,
    events: broadcast::Sender<ClientEvent>,
}

impl InboundDispatcher {
    pub fn new(
        topics: Arc<TopicRegistry>,
        parsers: ParserRegistry,
        handlers: HandlerRegistry,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            topics,
            parsers,
            handlers,
            events,
        }
    }

    pub fn set_parsers(&mut self, parsers: ParserRegistry) {
        self.parsers = parsers;
    }

    pub fn set_handlers(&mut self, handlers: HandlerRegistry) {
        self.handlers = handlers;
    }

    /// Run one inbound envelope through the pipeline
    pub fn dispatch(&self, wire_topic: &str, payload: &[u8]) -> DispatchOutcome {
        let _span = crate::dispatch_span!(wire_topic = %wire_topic, bytes = payload.len()).entered();

        let decompressed = match codec::decompress(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(wire_topic = %wire_topic, error = %e, "Failed to decompress payload, dropping");
                return DispatchOutcome::Dropped {
                    topic: wire_topic.to_string(),
                    reason: DropReason::Decompression,
                };
            }
        };

        let topic = self.topics.map_from_wire_id(wire_topic);

        let Some(parser) = self.parsers.get(&topic) else {
            warn!(topic = %topic, "No parser registered for topic, dropping");
            return DispatchOutcome::Dropped {
                topic,
                reason: DropReason::NoParser,
            };
        };

        let messages = match parser.parse(&topic, &decompressed) {
            Ok(messages) => messages,
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to parse payload, dropping");
                return DispatchOutcome::Dropped {
                    topic,
                    reason: DropReason::ParseFailed,
                };
            }
        };

        let mut report = DeliveryReport::default();
        for message in &messages {
            self.deliver(&topic, message, &mut report);
        }

        debug!(
            topic = %topic,
            handled = report.handled,
            skipped = report.skipped,
            recovered = report.recovered,
            escalated = report.escalated,
            "Envelope dispatched"
        );
        DispatchOutcome::Delivered(report)
    }

    fn deliver(&self, topic: &str, message: &DecodedMessage, report: &mut DeliveryReport) {
        let Some(handler) = self.handlers.get(&message.module) else {
            warn!(topic = %topic, module = %message.module, "No handler registered for module, skipping");
            report.skipped += 1;
            return;
        };

        // Handlers are application code; a panic is treated like any other
        // unexpected failure instead of taking the event loop down.
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle(message)))
            .unwrap_or_else(|_| Err(HandlerError::unexpected("handler panicked")));

        match result {
            Ok(()) => report.handled += 1,
            Err(HandlerError::Recoverable(reason)) => {
                warn!(module = %message.module, reason = %reason, "Handler rejected message");
                report.recovered += 1;
            }
            Err(e @ HandlerError::Unexpected(_)) => {
                error!(module = %message.module, error = %e, "Handler failed");
                let text = sanitize_error_message(&format!("[{}] {e}", message.module));
                // No subscribers is fine; the failure is already logged.
                let _ = self.events.send(ClientEvent::Warning(text));
                report.escalated += 1;
            }
        }
    }
}

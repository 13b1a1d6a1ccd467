//! Realtime session core
//!
//! The lifecycle manager ([`RealtimeClient`]) plus the pipelines it drives:
//! outbound publishes through [`PublishPipeline`] and inbound envelopes
//! through [`InboundDispatcher`].

pub mod backoff;
pub mod client;
pub mod codec;
pub mod dispatch;
pub mod publish;
pub mod state;
pub mod timer;

pub use backoff::{ReconnectConfig, ReconnectionDecision};
pub use client::{ClientOptions, RealtimeClient, RealtimeHandle};
pub use dispatch::{
    DecodedMessage, DeliveryReport, DispatchOutcome, DropReason, Handler, HandlerError,
    HandlerRegistry, InboundDispatcher, JsonParser, ParseError, Parser, ParserRegistry,
};
pub use publish::{OutboundFrame, PublishPipeline};
pub use state::ConnectionState;
pub use timer::Timer;

/// Notifications surfaced to the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Something failed that the client could not absorb on its own, such
    /// as a handler error or exhausted reconnect attempts. Secrets are
    /// redacted from the text.
    Warning(String),
}

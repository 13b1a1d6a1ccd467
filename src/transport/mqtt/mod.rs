//! rumqttc-backed transport adapter
//!
//! The module is split the same way as the rest of the transport code:
//!
//! - [`connection`] - Pure broker URL parsing and option building
//! - [`message_handler`] - Pure mapping of engine events to transport events
//! - [`client`] - Impure I/O: the adapter and its poll task
//!
//! # Usage
//!
//! ```rust,no_run
//! use realtime_client::transport::{event_channel, mqtt::RumqttTransport};
//!
//! let (events_tx, events_rx) = event_channel();
//! let transport = RumqttTransport::new(events_tx);
//! // hand `transport` and `events_rx` to a `RealtimeClient`
//! # drop((transport, events_rx));
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::RumqttTransport;
pub use connection::{configure_mqtt_options, parse_broker_url, EndpointError};
pub use message_handler::{EventRoute, MessageHandler};

//! Realtime push-messaging client
//!
//! An MQTT client for a proprietary realtime service: it negotiates a session
//! with a JSON handshake, subscribes to the feeds an account needs, keeps the
//! session alive across network failures, and routes compressed inbound
//! envelopes to application handlers.
//!
//! # Overview
//!
//! - [`protocol`] - Topic compression, feature flags, handshake and command types
//! - [`transport`] - The transport boundary and the rumqttc adapter
//! - [`realtime`] - Lifecycle manager plus the publish and dispatch pipelines
//! - [`config`] - TOML configuration
//! - [`observability`] - Structured logging
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use realtime_client::protocol::{AppInfo, DeviceIdentity, FeatureFlags, SessionNegotiator, TopicRegistry};
//!
//! let negotiator = SessionNegotiator::new(
//!     DeviceIdentity {
//!         user_agent: "Example UA".to_string(),
//!         device_id: "device-1".to_string(),
//!         device_secret: "secret".to_string(),
//!     },
//!     1234,
//!     FeatureFlags::default(),
//!     AppInfo::default(),
//! )
//! .unwrap();
//!
//! let handshake = negotiator.build(Utc::now()).unwrap();
//! assert!(handshake.starts_with(r#"{"u":1234,"#));
//!
//! let topics = TopicRegistry::new();
//! assert_eq!(topics.map_to_wire_id("/pubsub"), "88");
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod realtime;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, RealtimeConfig};
pub use error::{RealtimeError, RealtimeResult};
pub use protocol::*;
pub use realtime::{
    ClientEvent, ClientOptions, ConnectionState, RealtimeClient, RealtimeHandle,
};
pub use transport::mqtt::RumqttTransport;

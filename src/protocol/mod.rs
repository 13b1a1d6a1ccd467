//! Realtime protocol building blocks
//!
//! Topic compression, experiment flags, the session handshake, subscription
//! planning and the outbound command types. Everything here is pure data
//! assembly; the I/O lives in [`crate::realtime`] and [`crate::transport`].

pub mod commands;
pub mod flags;
pub mod handshake;
pub mod subscriptions;
pub mod topics;

pub use commands::{Command, IrisState, IrisSubscribe, JsonCommand, RawCommand, UpdateSubscriptions};
pub use flags::FeatureFlags;
pub use handshake::{AppInfo, DeviceIdentity, HandshakeError, SessionNegotiator};
pub use subscriptions::SubscriptionSet;
pub use topics::TopicRegistry;

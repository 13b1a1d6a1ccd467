//! Testing utilities and mock implementations
//!
//! Mocks for driving the realtime client without an MQTT broker.

pub mod mocks;

pub use mocks::*;

//! Observability for the realtime client
//!
//! Structured logging through `tracing`, configured from the environment.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{dispatch_span, lifecycle_span, mqtt_span};

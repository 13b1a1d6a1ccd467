//! Error types for the realtime client
//!
//! Connectivity failures never surface here: they are recovered by the
//! lifecycle manager. What remains are contract violations, local
//! serialization problems and setup errors.

use crate::config::ConfigError;
use crate::protocol::handshake::HandshakeError;
use crate::realtime::state::ConnectionState;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for realtime client operations
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("Client has been shut down")]
    ClientShutDown,

    #[error("Command serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for realtime client operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

const MAX_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)("?(?:password|pwd|token|secret|sessionid)"?\s*[=:]\s*)("[^"]*"|\S+)"#)
        .expect("static regex is valid")
});

/// Redact credential-looking values and cap the length of text that leaves
/// the client through the warning event surface
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}***")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(suffix);
    }

    sanitized
}

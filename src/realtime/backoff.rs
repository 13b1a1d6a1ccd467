//! Reconnect backoff policy
//!
//! Pure functions deciding whether and when the next connect attempt runs.

use serde::{Deserialize, Serialize};

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum reconnect attempts after the initial connect (None = unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Delay before each attempt in milliseconds
    #[serde(default = "default_backoff_pattern", rename = "backoff_ms")]
    pub backoff_pattern: Vec<u64>,
    /// Delay used once the pattern is exhausted
    #[serde(default = "default_sustained_delay", rename = "sustained_delay_ms")]
    pub sustained_delay: u64,
}

fn default_backoff_pattern() -> Vec<u64> {
    vec![1000, 2000, 4000, 8000, 16000, 32000]
}

fn default_sustained_delay() -> u64 {
    60_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: default_backoff_pattern(),
            sustained_delay: default_sustained_delay(),
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// Decide on the next attempt after `current_attempts` failures (pure function)
    pub fn next_attempt(&self, current_attempts: u32, shutdown_requested: bool) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = self.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let attempt = current_attempts + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: self.calculate_backoff_delay(attempt),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be greater than 0 or omitted for unlimited".to_string());
        }
        if self.sustained_delay == 0 {
            return Err("sustained_delay_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectionDecision {
    Proceed { attempt: u32, delay_ms: u64 },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}

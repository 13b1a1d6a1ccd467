/// Lifecycle state of a realtime client
///
/// Exactly one per client, mutated only by the client event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Built, `start()` not called yet
    Idle,
    /// A connect attempt is in flight or scheduled
    Connecting,
    /// Broker accepted the session
    Connected,
    /// `stop()` issued, waiting for the transport to close
    Disconnecting,
    /// Terminal; the instance is not reused
    ShutDown,
}

impl ConnectionState {
    /// Check if state allows publishing (pure function)
    pub fn can_publish(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connected_can_publish() {
        assert!(ConnectionState::Connected.can_publish());
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Disconnecting,
            ConnectionState::ShutDown,
        ] {
            assert!(!state.can_publish(), "{state:?} must not publish");
        }
    }
}

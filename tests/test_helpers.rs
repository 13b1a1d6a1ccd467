//! Test helpers and utilities for integration tests

use realtime_client::protocol::{AppInfo, DeviceIdentity, FeatureFlags, SessionNegotiator};
use realtime_client::realtime::{ClientOptions, ReconnectConfig, RealtimeClient};
use realtime_client::testing::MockTransport;
use realtime_client::transport::{BrokerEndpoint, TransportEvent};
use std::time::Duration;

#[allow(dead_code)]
pub const TEST_USER_ID: u64 = 1_234_567;

/// Keepalive used by lifecycle tests
#[allow(dead_code)]
pub const TEST_KEEPALIVE: Duration = Duration::from_secs(900);

#[allow(dead_code)]
pub fn test_device() -> DeviceIdentity {
    DeviceIdentity {
        user_agent: "Test UA".to_string(),
        device_id: "device-abc".to_string(),
        device_secret: "device-secret-value".to_string(),
    }
}

#[allow(dead_code)]
pub fn test_negotiator(flags: FeatureFlags) -> SessionNegotiator {
    SessionNegotiator::new(test_device(), TEST_USER_ID, flags, AppInfo::default())
        .expect("test negotiator is valid")
}

#[allow(dead_code)]
pub fn test_options() -> ClientOptions {
    ClientOptions {
        endpoint: BrokerEndpoint {
            host: "localhost".to_string(),
            port: 1883,
            tls: false,
        },
        client_id: "mqttwsclient".to_string(),
        connect_timeout: Duration::from_secs(5),
        keepalive: TEST_KEEPALIVE,
        reconnect: ReconnectConfig::default(),
    }
}

/// Client over a mock transport whose events are fed by hand
#[allow(dead_code)]
pub fn test_client(
    transport: MockTransport,
    flags: FeatureFlags,
) -> RealtimeClient<MockTransport> {
    RealtimeClient::new(transport, test_negotiator(flags), test_options())
}

/// Start the client and complete the session as the broker would
#[allow(dead_code)]
pub async fn connect(client: &mut RealtimeClient<MockTransport>, transport: &MockTransport) {
    client.start().await.expect("start succeeds");
    transport.set_connected(true);
    client.handle_transport_event(TransportEvent::Connected).await;
}

/// Report the session as lost
#[allow(dead_code)]
pub async fn drop_connection(client: &mut RealtimeClient<MockTransport>, transport: &MockTransport) {
    transport.set_connected(false);
    client
        .handle_transport_event(TransportEvent::Closed {
            reason: Some("network unreachable".to_string()),
        })
        .await;
}

//! Connection lifecycle tests
//!
//! Drive the realtime client through connect, close, reconnect and shutdown
//! against a mock transport. Timer behaviour runs on paused tokio time.

mod test_helpers;

use realtime_client::protocol::commands::{IrisState, JsonCommand, RawCommand};
use realtime_client::protocol::subscriptions::{direct_topic, live_topic, typing_topic};
use realtime_client::protocol::FeatureFlags;
use realtime_client::realtime::codec::decompress;
use realtime_client::realtime::{ClientEvent, ConnectionState, RealtimeClient};
use realtime_client::testing::MockTransport;
use realtime_client::transport::{event_channel, TransportEvent};
use realtime_client::RealtimeError;
use rumqttc::QoS;
use serde_json::{json, Value};
use std::time::Duration;
use test_helpers::*;
use tokio_test::{assert_err, assert_ok};

fn decoded(payload: &[u8]) -> Value {
    serde_json::from_slice(&decompress(payload).unwrap()).unwrap()
}

fn all_flags() -> FeatureFlags {
    FeatureFlags {
        iris_enabled: true,
        mqtt_live_enabled: true,
        graphql_enabled: true,
        msg_type_blacklist: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_close_cycles_never_duplicate_timers() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), FeatureFlags::default());

    client.start().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert!(client.keepalive_deadline().is_none());
    assert!(client.reconnect_deadline().is_none());

    for cycle in 1..=3 {
        transport.set_connected(true);
        client.handle_transport_event(TransportEvent::Connected).await;
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(client.keepalive_deadline().is_some(), "cycle {cycle}");
        assert!(client.reconnect_deadline().is_none(), "cycle {cycle}");

        // Traffic replaces the keepalive deadline rather than adding one
        let first_keepalive = client.keepalive_deadline();
        tokio::time::advance(Duration::from_secs(1)).await;
        client.handle_transport_event(TransportEvent::PingCompleted).await;
        assert!(client.keepalive_deadline() > first_keepalive);

        drop_connection(&mut client, &transport).await;
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(client.keepalive_deadline().is_none());
        let reconnect = client.reconnect_deadline();
        assert!(reconnect.is_some());

        // Duplicate close events leave the pending reconnect untouched
        client
            .handle_transport_event(TransportEvent::Closed { reason: None })
            .await;
        assert_eq!(client.reconnect_deadline(), reconnect);
        assert_eq!(client.attempts(), 1);

        client.on_reconnect_due().await;
        assert!(client.reconnect_deadline().is_none());
        assert_eq!(transport.get_connects().await.len(), cycle + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_follows_backoff_pattern() {
    let transport = MockTransport::new();
    transport.set_connect_failure(true);
    let mut client = test_client(transport.clone(), FeatureFlags::default());

    client.start().await.unwrap();

    for (attempt, delay_ms) in [(1, 1000), (2, 2000), (3, 4000), (4, 8000)] {
        let now = tokio::time::Instant::now();
        let deadline = client.reconnect_deadline().expect("reconnect scheduled");
        assert_eq!(deadline - now, Duration::from_millis(delay_ms));
        assert_eq!(client.attempts(), attempt);

        tokio::time::advance(Duration::from_millis(delay_ms)).await;
        client.on_reconnect_due().await;
    }
    assert_eq!(transport.get_connects().await.len(), 5);

    // Success resets the backoff
    transport.set_connect_failure(false);
    client.on_reconnect_due().await;
    transport.set_connected(true);
    client.handle_transport_event(TransportEvent::Connected).await;
    assert_eq!(client.attempts(), 0);
}

#[tokio::test]
async fn test_send_command_while_disconnected_never_reaches_transport() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), FeatureFlags::default());
    let command = JsonCommand::new("/ig_send_message", json!({"text": "hi"}), QoS::AtLeastOnce);

    // Idle
    let result = client.send_command(&command).await;
    assert!(matches!(
        result,
        Err(RealtimeError::NotConnected {
            state: ConnectionState::Idle
        })
    ));

    // Connecting
    client.start().await.unwrap();
    let result = client.send_command(&command).await;
    assert!(matches!(
        result,
        Err(RealtimeError::NotConnected {
            state: ConnectionState::Connecting
        })
    ));

    // Connected according to the state machine but the transport disagrees
    client.handle_transport_event(TransportEvent::Connected).await;
    transport.clear_history().await;
    assert!(matches!(
        client.send_command(&command).await,
        Err(RealtimeError::NotConnected { .. })
    ));

    assert!(transport.get_published_messages().await.is_empty());
}

#[tokio::test]
async fn test_send_command_when_connected_is_compressed_and_mapped() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), FeatureFlags::default());
    connect(&mut client, &transport).await;
    transport.clear_history().await;

    let command = JsonCommand::new("/ig_send_message", json!({"text": "hi"}), QoS::AtLeastOnce);
    assert_ok!(client.send_command(&command).await);

    let unknown = RawCommand {
        topic: "/not_in_registry".to_string(),
        payload: b"raw".to_vec(),
        qos: QoS::AtMostOnce,
    };
    assert_ok!(client.send_command(&unknown).await);

    let published = transport.get_published_messages().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, "132");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert_eq!(decoded(&published[0].payload), json!({"text": "hi"}));
    assert_eq!(published[1].topic, "/not_in_registry");
    assert_eq!(decompress(&published[1].payload).unwrap(), b"raw");
}

#[tokio::test]
async fn test_connected_publishes_all_planned_subscriptions() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), all_flags()).with_iris_state(IrisState {
        seq_id: 10,
        snapshot_at_ms: 20,
    });
    connect(&mut client, &transport).await;

    let published = transport.get_published_messages().await;
    let topics: Vec<&str> = published.iter().map(|m| m.topic.as_str()).collect();
    assert_eq!(topics, vec!["88", "149", "134"]);
    assert!(published.iter().all(|m| m.qos == QoS::AtLeastOnce));

    assert_eq!(
        decoded(&published[0].payload),
        json!({"sub": [direct_topic(TEST_USER_ID), live_topic(TEST_USER_ID)]})
    );
    assert_eq!(
        decoded(&published[1].payload),
        json!({"sub": [typing_topic(TEST_USER_ID)]})
    );
    assert_eq!(
        decoded(&published[2].payload),
        json!({"seq_id": 10, "snapshot_at_ms": 20})
    );
}

#[tokio::test]
async fn test_iris_subscribe_needs_sync_position() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), all_flags());
    connect(&mut client, &transport).await;

    let topics: Vec<String> = transport
        .get_published_messages()
        .await
        .into_iter()
        .map(|m| m.topic)
        .collect();
    assert_eq!(topics, vec!["88", "149"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_connected_event_does_not_resubscribe() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), all_flags()).with_iris_state(IrisState {
        seq_id: 1,
        snapshot_at_ms: 2,
    });
    connect(&mut client, &transport).await;
    assert_eq!(transport.get_published_messages().await.len(), 3);
    let first_keepalive = client.keepalive_deadline();

    tokio::time::advance(Duration::from_secs(1)).await;
    client.handle_transport_event(TransportEvent::Connected).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.get_published_messages().await.len(), 3);
    assert!(client.keepalive_deadline() > first_keepalive);
}

#[tokio::test]
async fn test_subscription_publish_failure_keeps_session() {
    let transport = MockTransport::new();
    transport.set_publish_failure(true);
    let mut client = test_client(transport.clone(), FeatureFlags::default());
    connect(&mut client, &transport).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.keepalive_deadline().is_some());
}

#[tokio::test]
async fn test_stop_then_closed_does_not_reconnect() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), FeatureFlags::default());
    connect(&mut client, &transport).await;

    client.stop().await;
    assert_eq!(transport.disconnect_count(), 1);
    assert_eq!(client.state(), ConnectionState::ShutDown);
    assert!(client.keepalive_deadline().is_none());

    client
        .handle_transport_event(TransportEvent::Closed {
            reason: Some("client disconnect".to_string()),
        })
        .await;
    client.on_reconnect_due().await;
    client.on_keepalive_expired().await;

    assert_eq!(client.state(), ConnectionState::ShutDown);
    assert!(client.reconnect_deadline().is_none());
    assert_eq!(transport.get_connects().await.len(), 1);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_cancels_pending_reconnect() {
    let transport = MockTransport::new();
    transport.set_connect_failure(true);
    let mut client = test_client(transport.clone(), FeatureFlags::default());

    client.start().await.unwrap();
    assert!(client.reconnect_deadline().is_some());

    client.stop().await;
    client.stop().await;

    assert_eq!(client.state(), ConnectionState::ShutDown);
    assert!(client.reconnect_deadline().is_none());
    assert_eq!(transport.disconnect_count(), 1);
    let err = assert_err!(client.start().await);
    assert!(matches!(err, RealtimeError::ClientShutDown));
}

#[tokio::test]
async fn test_keepalive_expiry_forces_disconnect() {
    let transport = MockTransport::new();
    let mut client = test_client(transport.clone(), FeatureFlags::default());
    connect(&mut client, &transport).await;

    client.on_keepalive_expired().await;
    assert_eq!(transport.disconnect_count(), 1);
    assert!(client.keepalive_deadline().is_none());

    // The close that follows drives the reconnect
    drop_connection(&mut client, &transport).await;
    assert!(client.reconnect_deadline().is_some());
}

#[tokio::test]
async fn test_exhausted_attempts_shut_down_with_warning() {
    let transport = MockTransport::new();
    transport.set_connect_failure(true);
    let mut options = test_options();
    options.reconnect.max_attempts = Some(2);
    let mut client = RealtimeClient::new(
        transport.clone(),
        test_negotiator(FeatureFlags::default()),
        options,
    );
    let mut warnings = client.subscribe();

    client.start().await.unwrap();
    client.on_reconnect_due().await;
    assert_eq!(client.state(), ConnectionState::Connecting);
    client.on_reconnect_due().await;

    assert_eq!(client.state(), ConnectionState::ShutDown);
    assert!(client.reconnect_deadline().is_none());
    assert_eq!(transport.get_connects().await.len(), 3);
    assert!(matches!(
        warnings.try_recv(),
        Ok(ClientEvent::Warning(text)) if text.contains("2 failed reconnect attempts")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_recovers_from_keepalive_expiry() {
    let (events_tx, events_rx) = event_channel();
    let transport = MockTransport::with_events(events_tx);
    let client = test_client(transport.clone(), FeatureFlags::default());
    let (handle, task) = client.spawn(events_rx);

    assert_ok!(handle.start().await);
    assert!(handle.wait_for_state(ConnectionState::Connected).await);
    assert!(handle.is_connected());
    assert_eq!(transport.get_connects().await.len(), 1);

    // Silence past the keepalive window, then the 1s backoff
    tokio::time::sleep(TEST_KEEPALIVE + Duration::from_secs(5)).await;

    assert_eq!(transport.disconnect_count(), 1);
    assert_eq!(transport.get_connects().await.len(), 2);
    assert_eq!(handle.state(), ConnectionState::Connected);

    handle.stop().await;
    task.await.unwrap();
    assert_eq!(handle.state(), ConnectionState::ShutDown);
    let err = assert_err!(handle.start().await);
    assert!(matches!(err, RealtimeError::ClientShutDown));
}

#[tokio::test]
async fn test_run_loop_sends_commands_through_handle() {
    let (events_tx, events_rx) = event_channel();
    let transport = MockTransport::with_events(events_tx);
    let client = test_client(transport.clone(), FeatureFlags::default());
    let (handle, task) = client.spawn(events_rx);

    assert_ok!(handle.start().await);
    assert!(handle.wait_for_state(ConnectionState::Connected).await);
    transport.clear_history().await;

    assert_ok!(
        handle
            .send_command(Box::new(JsonCommand::new(
                "/t_fs",
                json!({"state": 1}),
                QoS::AtMostOnce,
            )))
            .await
    );

    let published = transport.get_published_messages().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "102");

    handle.stop().await;
    task.await.unwrap();
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_client() {
    let (events_tx, events_rx) = event_channel();
    let transport = MockTransport::with_events(events_tx);
    let client = test_client(transport.clone(), FeatureFlags::default());
    let (handle, task) = client.spawn(events_rx);

    assert_ok!(handle.start().await);
    assert!(handle.wait_for_state(ConnectionState::Connected).await);
    drop(handle);

    task.await.unwrap();
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.get_connects().await.is_empty());
}

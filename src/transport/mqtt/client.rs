//! Impure I/O for the rumqttc transport adapter
//!
//! Each connect attempt builds a fresh rumqttc client and event loop and
//! spawns a poll task that translates engine events into
//! [`TransportEvent`]s. The poll task stops at the first terminal event:
//! reconnection is owned by the realtime client, never by rumqttc.

use super::connection::configure_mqtt_options;
use super::message_handler::{EventRoute, MessageHandler};
use crate::transport::{ConnectParams, EventSender, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Capacity of the rumqttc request queue
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Time the poll task gets to flush a DISCONNECT before it is aborted
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// rumqttc-backed implementation of [`Transport`]
pub struct RumqttTransport {
    events: EventSender,
    client: Option<AsyncClient>,
    poll_handle: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl RumqttTransport {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            client: None,
            poll_handle: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drop any previous session without reporting it
    fn teardown(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
        self.client = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn poll_loop(
        mut event_loop: EventLoop,
        connect_timeout: Duration,
        events: EventSender,
        connected: Arc<AtomicBool>,
    ) {
        if events.send(TransportEvent::Opened).is_err() {
            return;
        }

        let deadline = tokio::time::Instant::now() + connect_timeout;
        let mut established = false;

        loop {
            let polled = if established {
                Ok(event_loop.poll().await)
            } else {
                tokio::time::timeout_at(deadline, event_loop.poll()).await
            };

            let event = match polled {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    connected.store(false, Ordering::SeqCst);
                    let reason = e.to_string();
                    let _ = events.send(TransportEvent::Error(reason.clone()));
                    let _ = events.send(TransportEvent::Closed {
                        reason: Some(reason),
                    });
                    break;
                }
                Err(_) => {
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(TransportEvent::Closed {
                        reason: Some(format!(
                            "No session within {}s",
                            connect_timeout.as_secs()
                        )),
                    });
                    break;
                }
            };

            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::Forward(forwarded) => {
                    if forwarded == TransportEvent::Connected {
                        established = true;
                        connected.store(true, Ordering::SeqCst);
                    }
                    if events.send(forwarded).is_err() {
                        break;
                    }
                }
                EventRoute::Terminal(terminal) => {
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(terminal);
                    break;
                }
                EventRoute::Ignore => {
                    tracing::trace!(target: "mqtt_transport", "MQTT event: {:?}", event);
                }
            }
        }

        debug!(target: "mqtt_transport", "Poll task finished");
    }
}

#[async_trait]
impl Transport for RumqttTransport {
    async fn connect(&mut self, params: ConnectParams) -> Result<(), TransportError> {
        self.teardown();

        let options = configure_mqtt_options(&params);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        info!(
            host = %params.endpoint.host,
            port = params.endpoint.port,
            tls = params.endpoint.tls,
            "Opening MQTT session"
        );

        let span = crate::mqtt_span!(host = %params.endpoint.host, port = params.endpoint.port);
        let handle = tokio::spawn(
            Self::poll_loop(
                event_loop,
                params.timeout,
                self.events.clone(),
                self.connected.clone(),
            )
            .instrument(span),
        );

        self.client = Some(client);
        self.poll_handle = Some(handle);
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let result = match self.client.take() {
            Some(client) => client
                .disconnect()
                .await
                .map_err(|e| TransportError::DisconnectFailed(Box::new(e))),
            None => Ok(()),
        };

        if let Some(mut handle) = self.poll_handle.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle)
                .await
                .is_err()
            {
                warn!("Poll task did not stop after DISCONNECT, aborting");
                handle.abort();
                let _ = self.events.send(TransportEvent::Closed {
                    reason: Some("Session aborted".to_string()),
                });
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for RumqttTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }
}

//! Pure translation of rumqttc events into transport events

use crate::transport::TransportEvent;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// What the poll loop should do after an engine event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Forward to the client
    Forward(TransportEvent),
    /// Forward and stop polling, the session is over
    Terminal(TransportEvent),
    /// Engine bookkeeping the client does not care about
    Ignore,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route rumqttc event to a transport event (pure function)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(connack)) => match connack.code {
                ConnectReturnCode::Success => EventRoute::Forward(TransportEvent::Connected),
                code => EventRoute::Terminal(TransportEvent::Closed {
                    reason: Some(format!("Broker refused session: {code:?}")),
                }),
            },
            Event::Incoming(Packet::Publish(publish)) => {
                EventRoute::Forward(TransportEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                })
            }
            Event::Incoming(Packet::PingResp) => EventRoute::Forward(TransportEvent::PingCompleted),
            Event::Incoming(Packet::PubAck(_)) | Event::Incoming(Packet::PubComp(_)) => {
                EventRoute::Forward(TransportEvent::PublishCompleted)
            }
            Event::Incoming(Packet::Disconnect) => EventRoute::Terminal(TransportEvent::Closed {
                reason: Some("Broker disconnected".to_string()),
            }),
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::Terminal(TransportEvent::Closed {
                reason: Some("Client disconnected".to_string()),
            }),
            _ => EventRoute::Ignore,
        }
    }
}

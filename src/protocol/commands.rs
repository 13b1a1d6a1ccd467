//! Outbound commands
//!
//! Anything published through the client implements [`Command`]: it names a
//! topic, knows how to serialize itself and picks a QoS level.

use super::topics::{IRIS_SUB, PUBSUB, REALTIME_SUB};
use rumqttc::QoS;
use serde::Serialize;

/// Outbound command contract
pub trait Command: Send + Sync {
    /// Human-readable topic name (compressed by the publish pipeline)
    fn topic(&self) -> &str;

    /// Uncompressed payload bytes
    fn serialized_payload(&self) -> Result<Vec<u8>, serde_json::Error>;

    fn qos(&self) -> QoS {
        QoS::AtMostOnce
    }
}

/// Subscribe/unsubscribe request for either `/pubsub` or `/ig_realtime_sub`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateSubscriptions {
    #[serde(skip)]
    topic: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unsub: Vec<String>,
}

impl UpdateSubscriptions {
    pub fn pubsub(sub: Vec<String>, unsub: Vec<String>) -> Self {
        Self {
            topic: PUBSUB,
            sub,
            unsub,
        }
    }

    pub fn graphql(sub: Vec<String>, unsub: Vec<String>) -> Self {
        Self {
            topic: REALTIME_SUB,
            sub,
            unsub,
        }
    }
}

impl Command for UpdateSubscriptions {
    fn topic(&self) -> &str {
        self.topic
    }

    fn serialized_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn qos(&self) -> QoS {
        QoS::AtLeastOnce
    }
}

/// Inbox position used to resume the message-sync stream
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct IrisState {
    pub seq_id: u64,
    pub snapshot_at_ms: u64,
}

/// Iris subscription, sent after connect when iris is enabled
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IrisSubscribe {
    #[serde(flatten)]
    pub state: IrisState,
}

impl Command for IrisSubscribe {
    fn topic(&self) -> &str {
        IRIS_SUB
    }

    fn serialized_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn qos(&self) -> QoS {
        QoS::AtLeastOnce
    }
}

/// Any serializable body published as JSON to a named topic
#[derive(Debug, Clone)]
pub struct JsonCommand<T> {
    topic: String,
    body: T,
    qos: QoS,
}

impl<T: Serialize + Send + Sync> JsonCommand<T> {
    pub fn new(topic: impl Into<String>, body: T, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            body,
            qos,
        }
    }
}

impl<T: Serialize + Send + Sync> Command for JsonCommand<T> {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn serialized_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }

    fn qos(&self) -> QoS {
        self.qos
    }
}

/// Pre-serialized payload
#[derive(Debug, Clone)]
pub struct RawCommand {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl Command for RawCommand {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn serialized_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(self.payload.clone())
    }

    fn qos(&self) -> QoS {
        self.qos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn payload_json(command: &dyn Command) -> Value {
        serde_json::from_slice(&command.serialized_payload().unwrap()).unwrap()
    }

    #[test]
    fn test_update_subscriptions_omits_empty_lists() {
        let command = UpdateSubscriptions::pubsub(vec!["ig/u/v1/1".to_string()], vec![]);
        assert_eq!(command.topic(), PUBSUB);
        assert_eq!(command.qos(), QoS::AtLeastOnce);
        assert_eq!(payload_json(&command), json!({ "sub": ["ig/u/v1/1"] }));
    }

    #[test]
    fn test_update_subscriptions_unsubscribe() {
        let command = UpdateSubscriptions::graphql(vec![], vec!["t".to_string()]);
        assert_eq!(command.topic(), REALTIME_SUB);
        assert_eq!(payload_json(&command), json!({ "unsub": ["t"] }));
    }

    #[test]
    fn test_iris_subscribe_payload() {
        let command = IrisSubscribe {
            state: IrisState {
                seq_id: 15,
                snapshot_at_ms: 1_600_000_000_000,
            },
        };
        assert_eq!(command.topic(), IRIS_SUB);
        assert_eq!(
            payload_json(&command),
            json!({ "seq_id": 15, "snapshot_at_ms": 1_600_000_000_000u64 })
        );
    }

    #[test]
    fn test_json_and_raw_commands() {
        let json_command = JsonCommand::new("/t_fs", json!({ "fg": true }), QoS::AtMostOnce);
        assert_eq!(payload_json(&json_command), json!({ "fg": true }));

        let raw = RawCommand {
            topic: "/t_fs".to_string(),
            payload: b"abc".to_vec(),
            qos: QoS::AtLeastOnce,
        };
        assert_eq!(raw.serialized_payload().unwrap(), b"abc");
        assert_eq!(raw.qos(), QoS::AtLeastOnce);
    }
}

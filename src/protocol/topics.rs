//! Topic name compression for the realtime protocol
//!
//! Outbound topic names are replaced by short numeric identifiers before they
//! hit the wire, and inbound identifiers are expanded back to names before
//! dispatch. Both directions are total: a miss passes the input through
//! unchanged and is reported as a warning.

use std::collections::HashMap;
use tracing::warn;

pub const GRAPHQL: &str = "/graphql";
pub const PUBSUB: &str = "/pubsub";
pub const FOREGROUND_STATE: &str = "/t_fs";
pub const SEND_MESSAGE: &str = "/ig_send_message";
pub const SEND_MESSAGE_RESPONSE: &str = "/ig_send_message_response";
pub const IRIS_SUB: &str = "/ig_sub_iris";
pub const IRIS_SUB_RESPONSE: &str = "/ig_sub_iris_response";
pub const MESSAGE_SYNC: &str = "/ig_message_sync";
pub const REALTIME_SUB: &str = "/ig_realtime_sub";
pub const REGION_HINT: &str = "/t_region_hint";

/// Built-in name/wire-id table
const DEFAULT_TOPICS: &[(&str, &str)] = &[
    (GRAPHQL, "9"),
    (PUBSUB, "88"),
    (FOREGROUND_STATE, "102"),
    (SEND_MESSAGE, "132"),
    (SEND_MESSAGE_RESPONSE, "133"),
    (IRIS_SUB, "134"),
    (IRIS_SUB_RESPONSE, "135"),
    (MESSAGE_SYNC, "146"),
    (REALTIME_SUB, "149"),
    (REGION_HINT, "150"),
];

/// Bidirectional mapping between topic names and wire identifiers
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    to_wire: HashMap<String, String>,
    from_wire: HashMap<String, String>,
}

impl TopicRegistry {
    /// Registry holding the built-in topic table
    pub fn new() -> Self {
        Self::from_pairs(DEFAULT_TOPICS.iter().copied())
    }

    /// Build a registry from `(name, wire_id)` pairs
    pub fn from_pairs<I, N, W>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, W)>,
        N: Into<String>,
        W: Into<String>,
    {
        let mut to_wire = HashMap::new();
        let mut from_wire = HashMap::new();
        for (name, id) in pairs {
            let (name, id) = (name.into(), id.into());
            from_wire.insert(id.clone(), name.clone());
            to_wire.insert(name, id);
        }
        Self { to_wire, from_wire }
    }

    /// Compress a topic name to its wire identifier
    pub fn map_to_wire_id(&self, name: &str) -> String {
        match self.to_wire.get(name) {
            Some(id) => id.clone(),
            None => {
                warn!(topic = %name, "No wire id registered for topic, sending name as-is");
                name.to_string()
            }
        }
    }

    /// Expand a wire identifier back to its topic name
    pub fn map_from_wire_id(&self, id: &str) -> String {
        match self.from_wire.get(id) {
            Some(name) => name.clone(),
            None => {
                warn!(wire_id = %id, "Unknown wire id, dispatching as-is");
                id.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.to_wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_wire.is_empty()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_topics_round_trip() {
        let registry = TopicRegistry::new();
        for (name, id) in DEFAULT_TOPICS {
            assert_eq!(registry.map_to_wire_id(name), *id);
            assert_eq!(registry.map_from_wire_id(id), *name);
        }
        assert_eq!(registry.len(), DEFAULT_TOPICS.len());
    }

    #[test]
    fn test_pubsub_wire_id() {
        let registry = TopicRegistry::new();
        assert_eq!(registry.map_to_wire_id(PUBSUB), "88");
        assert_eq!(registry.map_from_wire_id("146"), MESSAGE_SYNC);
    }

    #[test]
    fn test_custom_table() {
        let registry = TopicRegistry::from_pairs([("/a", "1"), ("/b", "2")]);
        assert_eq!(registry.map_to_wire_id("/b"), "2");
        assert_eq!(registry.map_to_wire_id(PUBSUB), PUBSUB);
    }

    proptest! {
        #[test]
        fn unknown_names_pass_through(name in "[a-z_/]{1,24}") {
            let registry = TopicRegistry::new();
            prop_assume!(!DEFAULT_TOPICS.iter().any(|(n, _)| *n == name));
            prop_assert_eq!(registry.map_to_wire_id(&name), name.clone());
        }

        #[test]
        fn unknown_ids_pass_through(id in "[0-9]{4,8}") {
            let registry = TopicRegistry::new();
            prop_assert_eq!(registry.map_from_wire_id(&id), id.clone());
        }

        #[test]
        fn registered_names_round_trip(index in 0..DEFAULT_TOPICS.len()) {
            let registry = TopicRegistry::new();
            let name = DEFAULT_TOPICS[index].0;
            prop_assert_eq!(registry.map_from_wire_id(&registry.map_to_wire_id(name)), name);
        }
    }
}

//! Subscription planning
//!
//! Derives the pubsub and GraphQL topics a session subscribes to from the
//! account identity and the resolved feature flags.

use super::flags::FeatureFlags;
use serde_json::json;

/// GraphQL query id of the direct typing-indicator subscription
pub const DIRECT_TYPING_QUERY_ID: &str = "17867973967082385";

/// Pubsub topic carrying direct-message deltas for an account
pub fn direct_topic(user_id: u64) -> String {
    format!("ig/u/v1/{user_id}")
}

/// Pubsub topic carrying live broadcast notifications for an account
pub fn live_topic(user_id: u64) -> String {
    format!("ig/live_notification_subscribe/{user_id}")
}

/// GraphQL subscription topic for direct typing indicators
pub fn typing_topic(user_id: u64) -> String {
    let input = json!({ "input_data": { "user_id": user_id.to_string() } });
    format!("1/graphqlsubscriptions/{DIRECT_TYPING_QUERY_ID}/{input}")
}

/// Topics a session subscribes to once connected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    pub pubsub: Vec<String>,
    pub graphql: Vec<String>,
}

impl SubscriptionSet {
    pub fn plan(user_id: u64, flags: &FeatureFlags) -> Self {
        let mut pubsub = vec![direct_topic(user_id)];
        if flags.mqtt_live_enabled {
            pubsub.push(live_topic(user_id));
        }

        let mut graphql = Vec::new();
        if flags.graphql_enabled {
            graphql.push(typing_topic(user_id));
        }

        Self { pubsub, graphql }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_with_everything_disabled() {
        let set = SubscriptionSet::plan(42, &FeatureFlags::default());
        assert_eq!(set.pubsub, vec!["ig/u/v1/42".to_string()]);
        assert!(set.graphql.is_empty());
    }

    #[test]
    fn test_plan_with_everything_enabled() {
        let flags = FeatureFlags {
            iris_enabled: true,
            mqtt_live_enabled: true,
            graphql_enabled: true,
            msg_type_blacklist: None,
        };
        let set = SubscriptionSet::plan(42, &flags);
        assert_eq!(
            set.pubsub,
            vec![
                "ig/u/v1/42".to_string(),
                "ig/live_notification_subscribe/42".to_string()
            ]
        );
        assert_eq!(set.graphql.len(), 1);
    }

    #[test]
    fn test_typing_topic_format() {
        assert_eq!(
            typing_topic(7),
            r#"1/graphqlsubscriptions/17867973967082385/{"input_data":{"user_id":"7"}}"#
        );
    }
}

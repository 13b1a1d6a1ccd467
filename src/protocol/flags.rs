//! Resolved experiment flags
//!
//! Computed once from configuration when a client is built and never
//! re-derived afterwards; a new client picks up changed flags.

use crate::config::ExperimentsSection;

/// Message type that is suppressed over pubsub when typing arrives via GraphQL
pub const TYPING_TYPE: &str = "typing_type";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub iris_enabled: bool,
    pub mqtt_live_enabled: bool,
    pub graphql_enabled: bool,
    pub msg_type_blacklist: Option<String>,
}

impl FeatureFlags {
    pub fn from_experiments(experiments: &ExperimentsSection) -> Self {
        let msg_type_blacklist = experiments
            .msg_type_blacklist
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            iris_enabled: experiments.iris_enabled,
            mqtt_live_enabled: experiments.mqtt_live_enabled,
            graphql_enabled: experiments.graphql_enabled,
            msg_type_blacklist,
        }
    }

    /// Blacklist sent in the handshake, `None` when nothing is blacklisted
    pub fn effective_msg_type_blacklist(&self) -> Option<String> {
        let configured = self.msg_type_blacklist.as_deref().unwrap_or("");
        let blacklist = match (configured.is_empty(), self.graphql_enabled) {
            (true, true) => TYPING_TYPE.to_string(),
            (false, true) => format!("{configured}, {TYPING_TYPE}"),
            (_, false) => configured.to_string(),
        };
        (!blacklist.is_empty()).then_some(blacklist)
    }
}

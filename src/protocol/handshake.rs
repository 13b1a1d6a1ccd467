//! Session handshake payload
//!
//! The handshake is a JSON document presented as the MQTT username when the
//! session is opened. It carries the device and account identity, capability
//! bitmasks, the topics the broker should start delivering, and app specific
//! info derived from the feature flags.
//!
//! The account id (`u`) and session id (`mqtt_sid`) must appear as bare
//! numeric literals. The payload is first serialized with nonce-tagged string
//! placeholders in their place, and the quoted placeholders are then replaced
//! with the decimal values. The substitution is plain text surgery over JSON
//! that is already valid, so the numbers are never routed through the JSON
//! number encoder.

use super::flags::FeatureFlags;
use super::topics::{IRIS_SUB_RESPONSE, MESSAGE_SYNC, PUBSUB, REALTIME_SUB, SEND_MESSAGE_RESPONSE};
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Handshake field missing: {0}")]
    MissingField(&'static str),
    #[error("Handshake serialization failed")]
    Serialization(#[from] serde_json::Error),
}

/// Device credentials used to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub user_agent: String,
    pub device_id: String,
    pub device_secret: String,
}

/// Client build description advertised to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub platform: String,
    pub app_version: String,
    pub capabilities: String,
    pub client_capabilities: u64,
    pub endpoint_capabilities: u64,
    pub app_id: u64,
    pub locale: String,
    pub foreground: bool,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            platform: "android".to_string(),
            app_version: "107.0.0.27.121".to_string(),
            capabilities: "3brTvw==".to_string(),
            client_capabilities: 439,
            endpoint_capabilities: 0,
            app_id: 567_067_343_352_427,
            locale: "en_US".to_string(),
            foreground: true,
        }
    }
}

#[derive(Serialize)]
struct HandshakePayload<'a> {
    u: &'a str,
    cp: u64,
    ecp: u64,
    chat_on: bool,
    fg: bool,
    d: &'a str,
    ct: &'static str,
    mqtt_sid: &'a str,
    aid: u64,
    st: Vec<&'static str>,
    pm: Vec<String>,
    dc: &'static str,
    no_auto_fg: bool,
    a: &'a str,
    pwd: &'a str,
    app_specific_info: AppSpecificInfo<'a>,
}

// Field order is significant: the broker expects Accept-Language last.
#[derive(Serialize)]
struct AppSpecificInfo<'a> {
    platform: &'a str,
    app_version: &'a str,
    capabilities: &'a str,
    #[serde(rename = "User-Agent")]
    user_agent: &'a str,
    #[serde(rename = "msgTypeBlacklist", skip_serializing_if = "Option::is_none")]
    msg_type_blacklist: Option<String>,
    #[serde(rename = "Accept-Language")]
    accept_language: &'a str,
}

/// Builds the handshake payload for each connect attempt
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    device: DeviceIdentity,
    user_id: u64,
    flags: FeatureFlags,
    app: AppInfo,
}

impl SessionNegotiator {
    pub fn new(
        device: DeviceIdentity,
        user_id: u64,
        flags: FeatureFlags,
        app: AppInfo,
    ) -> Result<Self, HandshakeError> {
        if device.user_agent.trim().is_empty() {
            return Err(HandshakeError::MissingField("user_agent"));
        }
        if device.device_id.trim().is_empty() {
            return Err(HandshakeError::MissingField("device_id"));
        }
        if device.device_secret.is_empty() {
            return Err(HandshakeError::MissingField("device_secret"));
        }
        if user_id == 0 {
            return Err(HandshakeError::MissingField("user_id"));
        }

        Ok(Self {
            device,
            user_id,
            flags,
            app,
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// Topics the broker starts delivering as soon as the session opens
    pub fn subscribe_topics(&self) -> Vec<&'static str> {
        let mut topics = vec![PUBSUB];
        if self.flags.graphql_enabled {
            topics.push(REALTIME_SUB);
        }
        topics.push(SEND_MESSAGE_RESPONSE);
        if self.flags.iris_enabled {
            topics.push(IRIS_SUB_RESPONSE);
            topics.push(MESSAGE_SYNC);
        }
        topics
    }

    /// Build the handshake for a connect attempt made at `now`
    pub fn build(&self, now: DateTime<Utc>) -> Result<String, HandshakeError> {
        self.build_with_nonce(now, rand::random::<u32>())
    }

    fn build_with_nonce(&self, now: DateTime<Utc>, nonce: u32) -> Result<String, HandshakeError> {
        let user_placeholder = format!("%ACCOUNT_ID_{nonce}%");
        let session_placeholder = format!("%SESSION_ID_{nonce}%");

        let payload = HandshakePayload {
            u: &user_placeholder,
            cp: self.app.client_capabilities,
            ecp: self.app.endpoint_capabilities,
            chat_on: true,
            fg: self.app.foreground,
            d: &self.device.device_id,
            ct: "cookie_auth",
            mqtt_sid: &session_placeholder,
            aid: self.app.app_id,
            st: self.subscribe_topics(),
            pm: Vec::new(),
            dc: "",
            no_auto_fg: true,
            a: &self.device.user_agent,
            pwd: &self.device.device_secret,
            app_specific_info: AppSpecificInfo {
                platform: &self.app.platform,
                app_version: &self.app.app_version,
                capabilities: &self.app.capabilities,
                user_agent: &self.device.user_agent,
                msg_type_blacklist: self.flags.effective_msg_type_blacklist(),
                accept_language: &self.app.locale,
            },
        };

        let encoded = serde_json::to_string(&payload)?;
        Ok(encoded
            .replace(&format!("\"{user_placeholder}\""), &self.user_id.to_string())
            .replace(
                &format!("\"{session_placeholder}\""),
                &session_id(now).to_string(),
            ))
    }
}

/// Milliseconds since Monday 00:00 UTC of the current week
///
/// Stands in for a process uptime counter.
pub fn session_id(now: DateTime<Utc>) -> i64 {
    let days = i64::from(now.weekday().num_days_from_monday());
    let week_start = (now.date_naive() - chrono::Duration::days(days))
        .and_time(NaiveTime::MIN)
        .and_utc();
    (now - week_start).num_milliseconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn device() -> DeviceIdentity {
        DeviceIdentity {
            user_agent: "Realtime-Test/1.0".to_string(),
            device_id: "android-0123456789abcdef".to_string(),
            device_secret: "s3cret".to_string(),
        }
    }

    fn all_flags() -> FeatureFlags {
        FeatureFlags {
            iris_enabled: true,
            mqtt_live_enabled: true,
            graphql_enabled: true,
            msg_type_blacklist: None,
        }
    }

    #[test]
    fn test_session_id_counts_from_monday() {
        // 2024-01-01 was a Monday
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()
            + chrono::Duration::milliseconds(500);
        assert_eq!(session_id(now), 1500);

        let wednesday = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(session_id(wednesday), 2 * 24 * 3600 * 1000);
    }

    #[test]
    fn test_numeric_fields_are_unquoted() {
        let negotiator =
            SessionNegotiator::new(device(), 17_841_400_000_000_001, all_flags(), AppInfo::default())
                .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let payload = negotiator.build_with_nonce(now, 77).unwrap();

        assert!(payload.starts_with("{\"u\":17841400000000001,"));
        assert!(payload.contains("\"mqtt_sid\":86400000,"));
        assert!(!payload.contains("%ACCOUNT_ID_77%"));
        assert!(!payload.contains("%SESSION_ID_77%"));

        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["u"].as_u64(), Some(17_841_400_000_000_001));
        assert_eq!(value["mqtt_sid"].as_i64(), Some(86_400_000));
    }

    #[test]
    fn test_subscribe_topics_with_all_flags() {
        let negotiator =
            SessionNegotiator::new(device(), 1, all_flags(), AppInfo::default()).unwrap();
        assert_eq!(
            negotiator.subscribe_topics(),
            vec![
                PUBSUB,
                REALTIME_SUB,
                SEND_MESSAGE_RESPONSE,
                IRIS_SUB_RESPONSE,
                MESSAGE_SYNC
            ]
        );
    }

    #[test]
    fn test_subscribe_topics_minimal() {
        let negotiator =
            SessionNegotiator::new(device(), 1, FeatureFlags::default(), AppInfo::default())
                .unwrap();
        assert_eq!(
            negotiator.subscribe_topics(),
            vec![PUBSUB, SEND_MESSAGE_RESPONSE]
        );
    }

    #[test]
    fn test_app_specific_info_locale_last() {
        let negotiator =
            SessionNegotiator::new(device(), 1, all_flags(), AppInfo::default()).unwrap();
        let payload = negotiator.build(Utc::now()).unwrap();

        let info_start = payload.find("\"app_specific_info\":{").unwrap();
        let info = &payload[info_start..];
        assert!(info.contains("\"msgTypeBlacklist\":\"typing_type\""));
        assert!(info.ends_with("\"Accept-Language\":\"en_US\"}}"));
    }

    #[test]
    fn test_blacklist_omitted_when_empty() {
        let negotiator =
            SessionNegotiator::new(device(), 1, FeatureFlags::default(), AppInfo::default())
                .unwrap();
        let payload = negotiator.build(Utc::now()).unwrap();
        assert!(!payload.contains("msgTypeBlacklist"));
    }

    #[test]
    fn test_missing_identity_fails_fast() {
        let mut missing_agent = device();
        missing_agent.user_agent = String::new();
        assert!(matches!(
            SessionNegotiator::new(missing_agent, 1, FeatureFlags::default(), AppInfo::default()),
            Err(HandshakeError::MissingField("user_agent"))
        ));

        assert!(matches!(
            SessionNegotiator::new(device(), 0, FeatureFlags::default(), AppInfo::default()),
            Err(HandshakeError::MissingField("user_id"))
        ));
    }
}

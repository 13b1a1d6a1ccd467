//! Configuration for the realtime client
//!
//! Loaded from TOML. Secrets are never stored in the file: the device secret
//! is read from the environment variable named by `device.device_secret_env`
//! when the session negotiator is built.

use crate::protocol::{AppInfo, DeviceIdentity, FeatureFlags};
use crate::realtime::backoff::ReconnectConfig;
use crate::transport::mqtt::parse_broker_url;
use crate::transport::BrokerEndpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    pub device: DeviceSection,
    pub account: AccountSection,
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub experiments: ExperimentsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, e.g. `mqtts://edge-mqtt.example.com:443`
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum silence before the session is torn down (default: 900)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_keepalive() -> u64 {
    900 // 15 minutes
}

fn default_client_id() -> String {
    "mqttwsclient".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    pub user_agent: String,
    pub device_id: String,
    /// Environment variable containing the device secret
    #[serde(default = "default_device_secret_env")]
    pub device_secret_env: String,
}

fn default_device_secret_env() -> String {
    "REALTIME_DEVICE_SECRET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSection {
    pub user_id: u64,
}

/// Client build description; every field falls back to the stock values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub platform: String,
    pub app_version: String,
    pub capabilities: String,
    pub client_capabilities: u64,
    pub endpoint_capabilities: u64,
    pub app_id: u64,
    pub locale: String,
    pub foreground: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        let app = AppInfo::default();
        Self {
            platform: app.platform,
            app_version: app.app_version,
            capabilities: app.capabilities,
            client_capabilities: app.client_capabilities,
            endpoint_capabilities: app.endpoint_capabilities,
            app_id: app.app_id,
            locale: app.locale,
            foreground: app.foreground,
        }
    }
}

/// Experiment switches; all off by default
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExperimentsSection {
    pub iris_enabled: bool,
    pub mqtt_live_enabled: bool,
    pub graphql_enabled: bool,
    /// Comma separated message types the broker should not deliver
    pub msg_type_blacklist: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RealtimeConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RealtimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.broker.keepalive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.keepalive_secs must be greater than 0".to_string(),
            ));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.client_id must not be empty".to_string(),
            ));
        }
        if self.account.user_id == 0 {
            return Err(ConfigError::InvalidConfig(
                "account.user_id must be non-zero".to_string(),
            ));
        }
        if self.device.device_secret_env.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.device_secret_env must name an environment variable".to_string(),
            ));
        }

        self.reconnect
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("reconnect: {e}")))
    }

    pub fn endpoint(&self) -> Result<BrokerEndpoint, ConfigError> {
        parse_broker_url(&self.broker.url)
            .map_err(|e| ConfigError::InvalidConfig(format!("broker.url: {e}")))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.connect_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.broker.keepalive_secs)
    }

    /// Get the device secret from its environment variable
    pub fn get_device_secret(&self) -> Result<String, ConfigError> {
        let name = &self.device.device_secret_env;
        std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound(name.clone()))
    }

    pub fn device_identity(&self) -> Result<DeviceIdentity, ConfigError> {
        Ok(DeviceIdentity {
            user_agent: self.device.user_agent.clone(),
            device_id: self.device.device_id.clone(),
            device_secret: self.get_device_secret()?,
        })
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags::from_experiments(&self.experiments)
    }

    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            platform: self.app.platform.clone(),
            app_version: self.app.app_version.clone(),
            capabilities: self.app.capabilities.clone(),
            client_capabilities: self.app.client_capabilities,
            endpoint_capabilities: self.app.endpoint_capabilities,
            app_id: self.app.app_id,
            locale: self.app.locale.clone(),
            foreground: self.app.foreground,
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
url = "mqtt://localhost:1883"

[device]
user_agent = "Test UA"
device_id = "device-123"
device_secret_env = "TEST_DEVICE_SECRET"

[account]
user_id = 1234
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

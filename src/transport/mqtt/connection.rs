//! Pure connection configuration for the rumqttc adapter
//!
//! Broker URL parsing and translation of [`ConnectParams`] into rumqttc
//! options. Nothing in here touches the network.

use crate::transport::{BrokerEndpoint, ConnectParams};
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// MQTT-level ping interval; pings count as traffic for the client keepalive
pub const MQTT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for a single inbound or outbound packet
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Unsupported broker URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Parse `mqtt://`, `tcp://`, `mqtts://` or `ssl://` broker URLs
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerEndpoint, EndpointError> {
    let url =
        Url::parse(broker_url).map_err(|_| EndpointError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| EndpointError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerEndpoint {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Translate connect parameters into rumqttc options
///
/// The handshake travels in the username field; the password stays empty.
pub fn configure_mqtt_options(params: &ConnectParams) -> MqttOptions {
    let endpoint = &params.endpoint;
    let mut options = MqttOptions::new(&params.client_id, &endpoint.host, endpoint.port);

    if endpoint.tls {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    options.set_credentials(params.handshake.clone(), String::new());
    options.set_keep_alive(MQTT_PING_INTERVAL);
    options.set_clean_session(true);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    options
}

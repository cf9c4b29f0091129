//! MQTT broker transport backed by rumqttc.
//!
//! A background task polls the rumqttc event loop and translates packets
//! into [`TransportEvent`]s. There is no automatic reconnect: the first
//! terminal error closes the session and every pending call with it.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use url::Url;

use crate::traits::{Transport, TransportError, TransportEvent};

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

/// Depth of the inbound event channel and the rumqttc request queue.
const EVENT_CAPACITY: usize = 256;

/// Parsed broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    /// Broker hostname or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Whether to wrap the connection in TLS (`mqtts`).
    pub tls: bool,
}

impl BrokerAddr {
    /// Parse an `mqtt://` or `mqtts://` URI.
    ///
    /// Ports default to 1883 (`mqtt`) and 8883 (`mqtts`).
    ///
    /// # Errors
    /// Returns an error for other schemes, unparsable URIs, or a missing
    /// host.
    pub fn parse(uri: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidEndpoint {
            uri: uri.to_string(),
            reason,
        };
        let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        let tls = match url.scheme() {
            "mqtt" => false,
            "mqtts" => true,
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if tls { MQTTS_PORT } else { MQTT_PORT });
        Ok(Self { host, port, tls })
    }
}

/// Username/password pair presented to the broker.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// MQTT username.
    pub username: String,
    /// MQTT password.
    pub password: String,
}

/// Connection settings for [`MqttTransport::connect`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker endpoint.
    pub addr: BrokerAddr,
    /// Client identifier on the broker.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Credentials, when the broker requires them.
    pub credentials: Option<Credentials>,
}

/// MQTT connection wrapping a rumqttc client.
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Open a connection and start the background poll task.
    ///
    /// The returned receiver yields [`TransportEvent::Connected`] once
    /// the broker acknowledges the session, or [`TransportEvent::Closed`]
    /// when it refuses or is unreachable.
    #[must_use]
    pub fn connect(settings: MqttSettings) -> (Self, mpsc::Receiver<TransportEvent>) {
        let mut options = MqttOptions::new(
            settings.client_id.as_str(),
            settings.addr.host.as_str(),
            settings.addr.port,
        );
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        if settings.addr.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        if let Some(credentials) = &settings.credentials {
            options.set_credentials(credentials.username.as_str(), credentials.password.as_str());
        }

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        tokio::spawn(async move {
            loop {
                let event = match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            TransportEvent::Connected
                        } else {
                            let reason = format!("{:?}", ack.code);
                            tracing::warn!(%reason, "broker refused the session");
                            let _ = event_tx
                                .send(TransportEvent::Closed {
                                    reason: Some(reason),
                                })
                                .await;
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    },
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        let _ = event_tx.send(TransportEvent::Closed { reason: None }).await;
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "mqtt event loop terminated");
                        let _ = event_tx
                            .send(TransportEvent::Closed {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    // Receiver gone, nobody left to notify.
                    break;
                }
            }
        });

        (Self { client }, event_rx)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect after event loop already stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_endpoint() {
        let addr = BrokerAddr::parse("mqtt://broker.example.org").unwrap();
        assert_eq!(addr.host, "broker.example.org");
        assert_eq!(addr.port, MQTT_PORT);
        assert!(!addr.tls);
    }

    #[test]
    fn parse_tls_endpoint_with_port() {
        let addr = BrokerAddr::parse("mqtts://broker.example.org:8884").unwrap();
        assert_eq!(addr.port, 8884);
        assert!(addr.tls);
    }

    #[test]
    fn parse_rejects_foreign_schemes() {
        let err = BrokerAddr::parse("http://broker.example.org").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }
}

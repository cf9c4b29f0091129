//! Client configuration.

use std::time::Duration;

use remote_call_core::topic::{self, TopicError};

/// Domain used when none is configured.
pub const DEFAULT_DOMAIN: &str = "public";

/// Username presented when only a token is configured.
const TOKEN_USERNAME: &str = "__token__";

/// Options for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target agent identifier.
    pub agent: String,
    /// Namespace grouping agents and clients on the broker.
    pub domain: String,
    /// Broker endpoint URI (`mqtt://…` or `mqtts://…`).
    pub broker: String,
    /// Access token, sent as the MQTT password.
    pub token: Option<String>,
    /// Explicit MQTT username. When absent but a token is set, the
    /// token marker username is presented instead.
    pub username: Option<String>,
    /// Keep-alive interval for the broker session.
    pub keep_alive: Duration,
    /// How long a call may wait for its reply.
    pub call_timeout: Duration,
    /// How long to wait for the broker to acknowledge the session.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for an agent behind a broker, with
    /// default domain and timing.
    #[must_use]
    pub fn new(agent: impl Into<String>, broker: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            broker: broker.into(),
            token: None,
            username: None,
            keep_alive: Duration::from_secs(30),
            call_timeout: Duration::from_secs(6),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the access token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set an explicit MQTT username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the per-call reply timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Username/password pair for the broker: an explicit username wins,
    /// a bare token rides under the token marker username.
    #[must_use]
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.token) {
            (Some(username), token) => {
                Some((username.clone(), token.clone().unwrap_or_default()))
            }
            (None, Some(token)) => Some((TOKEN_USERNAME.to_string(), token.clone())),
            (None, None) => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TopicError> {
        topic::validate_segment("domain", &self.domain)?;
        topic::validate_segment("agent", &self.agent)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("board-1", "mqtt://localhost:1883");
        assert_eq!(config.domain, DEFAULT_DOMAIN);
        assert!(config.credentials().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bare_token_uses_marker_username() {
        let config =
            ClientConfig::new("board-1", "mqtts://broker.example.org").with_token("s3cret");
        assert_eq!(
            config.credentials(),
            Some(("__token__".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn explicit_username_wins() {
        let config = ClientConfig::new("board-1", "mqtts://broker.example.org")
            .with_username("ops")
            .with_token("s3cret");
        assert_eq!(
            config.credentials(),
            Some(("ops".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn validation_rejects_routing_characters() {
        let config = ClientConfig::new("boards/1", "mqtt://localhost");
        assert!(config.validate().is_err());

        let config = ClientConfig::new("board-1", "mqtt://localhost").with_domain("lab/+");
        assert!(config.validate().is_err());
    }
}

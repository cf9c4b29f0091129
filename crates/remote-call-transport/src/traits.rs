//! Transport seam between the client and the broker.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker endpoint `{uri}`: {reason}")]
    InvalidEndpoint { uri: String, reason: String },
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("broker refused the session: {0}")]
    Refused(String),
    #[error("connection closed")]
    Closed,
}

/// Inbound event from a broker connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Broker acknowledged the session.
    Connected,
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload bytes.
        payload: Bytes,
    },
    /// The connection is gone and will not recover.
    ///
    /// `reason` is `None` for a requested disconnect.
    Closed { reason: Option<String> },
}

/// An established broker connection.
///
/// Constructors are implementation-specific and return the connection
/// paired with an `mpsc::Receiver<TransportEvent>` feeding inbound
/// events, so callers decide how long to wait for the acknowledgment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic.
    ///
    /// # Errors
    /// Returns an error if the connection is already released.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to a topic.
    ///
    /// # Errors
    /// Returns an error if the connection is already released.
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self);
}
